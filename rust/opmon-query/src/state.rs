use crate::{config::AppConfig, datasource::DataSource};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub datasource: DataSource,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, datasource: DataSource) -> Self {
        Self { config, datasource }
    }
}
