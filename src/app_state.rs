use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;

use crate::{
    api::ApiUrls,
    config::AppConfig,
    db::{self, DbPool},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: Client,
    pub api_urls: Arc<ApiUrls>,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            db_pool,
            http_client,
            api_urls: Arc::new(ApiUrls::from_config(config)),
        })
    }

    /// State whose pool connects on first use. Used by tests that never
    /// reach the database.
    pub fn lazy(config: &AppConfig) -> Result<Self> {
        Self::new(db::connect_lazy(&config.database), config)
    }
}
