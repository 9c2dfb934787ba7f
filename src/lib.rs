pub mod adapters;
pub mod config;
pub mod console;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod gateway;
pub mod harness;
pub mod markdown;
pub mod models;
pub mod redaction;
pub mod runner;
pub mod shaping;

use crate::adapters::gemini::GeminiAdapter;
use crate::config::DashboardConfig;
use crate::console::ConsoleApp;
use crate::dashboard::DashboardCore;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::gateway::AiGateway;
use crate::runner::CliGenerator;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Starts the dashboard. A missing API key stops startup before any store access.
pub async fn run() -> AppResult<()> {
    let config = DashboardConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;
    init_tracing(&config.log_dir())?;
    tracing::info!(data_dir = %config.data_dir.display(), "starting financial dashboard");

    let db = Arc::new(Database::new(&config.db_path())?);
    let settings = db.get_settings()?;
    let generator = CliGenerator::new(Arc::new(GeminiAdapter), settings.clone(), config.api_key.clone());
    let gateway = AiGateway::new(generator, settings.model.clone());
    let core = DashboardCore::new(db.clone(), gateway);

    let result = console::run(ConsoleApp::new(core, db)).await;
    if let Err(error) = &result {
        tracing::error!(code = error.code(), error = %error, "dashboard stopped with an error");
    } else {
        tracing::info!("dashboard closed");
    }
    result
}

fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Config(format!("failed to initialise logging: {}", error)))
}
