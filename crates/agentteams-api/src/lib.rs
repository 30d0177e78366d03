//! HTTP surface for agent team tasks.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
