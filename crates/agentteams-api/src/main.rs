use std::sync::Arc;

use agentteams_agents::build_hierarchy;
use agentteams_api::{config::AppConfig, routes, state::AppState};
use agentteams_core::llm::OpenAiChatModel;
use agentteams_core::{
    ConfigLoader, TaskLog, TaskService, TelemetryOptions, init_metrics_from_env, init_telemetry,
};
use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load(None)?;
    init_telemetry(TelemetryOptions::default().with_level(config.logging.level.clone()))?;
    init_metrics_from_env("agentteams-api");

    let app_config = AppConfig::from_env()?;
    let model = Arc::new(OpenAiChatModel::from_config(&config)?);
    let graph = build_hierarchy(model, &config)?;

    let mut service =
        TaskService::new(Arc::new(graph)).with_default_max_depth(config.teams.max_depth);
    if app_config.task_log_enabled {
        let log = TaskLog::from_env();
        info!(dir = %log.base_dir().display(), "task audit log enabled");
        service = service.with_task_log(log);
    }
    let state = AppState::new(service, &app_config);

    let app: Router = routes::build_router(state);

    let listener = TcpListener::bind(&app_config.listen_addr).await?;
    info!(
        address = %app_config.listen_addr,
        max_tasks = app_config.max_concurrent_tasks,
        "agentteams-api listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
