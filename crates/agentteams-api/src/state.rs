use std::sync::Arc;

use agentteams_core::TaskService;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::AppConfig;
use crate::error::AppError;

/// Shared state of the HTTP service.
#[derive(Clone)]
pub struct AppState {
    service: TaskService,
    permits: Arc<Semaphore>,
    max_tasks: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CapacitySnapshot {
    pub max_tasks: usize,
    pub available_permits: usize,
    pub running_tasks: usize,
}

impl AppState {
    pub fn new(service: TaskService, config: &AppConfig) -> Self {
        let max_tasks = config.max_concurrent_tasks.max(1);
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_tasks)),
            max_tasks,
        }
    }

    pub fn service(&self) -> &TaskService {
        &self.service
    }

    /// Reserve a task slot without waiting.
    pub fn try_acquire(&self) -> Result<OwnedSemaphorePermit, AppError> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::at_capacity(self.max_tasks))
    }

    pub fn capacity(&self) -> CapacitySnapshot {
        let available_permits = self.permits.available_permits();
        CapacitySnapshot {
            max_tasks: self.max_tasks,
            available_permits,
            running_tasks: self.max_tasks.saturating_sub(available_permits),
        }
    }
}
