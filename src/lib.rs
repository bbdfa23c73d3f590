pub mod aggregate;
pub mod config;
pub mod connector;
pub mod connectors;
pub mod error;
pub mod log;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod sentiment;
pub mod store;
pub mod ui;

use anyhow::Result;
use tracing::{debug, info};

use crate::pipeline::{Pipeline, RunMode};
use crate::report::{RunReport, StatusReport};

fn load_config(config_path: Option<&str>) -> Result<config::AppConfig> {
    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// Builds the pipeline from configuration and executes one run.
pub async fn run(mode: RunMode, config_path: Option<&str>) -> Result<RunReport> {
    info!("Market Intel starting...");
    let config = load_config(config_path)?;
    let pipeline = Pipeline::new(config)?;
    pipeline.run(mode).await
}

/// Opens the store directly and reports per-table record counts alongside
/// the effective configuration. Read-only: no connectors or HTTP clients
/// are constructed.
pub fn status(config_path: Option<&str>) -> Result<StatusReport> {
    let config = load_config(config_path)?;
    let database = config.database_path()?;
    let store = store::Store::open(&database)?;
    Ok(StatusReport {
        database,
        tracked_assets: config.tracked_assets,
        record_counts: store.record_counts()?,
    })
}
