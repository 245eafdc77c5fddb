pub mod backend;
pub mod batch;
pub mod config;
pub mod datasource;
pub mod editor;
pub mod error;
pub mod frames;
pub mod model;
pub mod normalize;
pub mod options;
pub mod pattern;
pub mod server;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod variables;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the OpMon query service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config)?.run().await
}
