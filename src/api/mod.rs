pub mod users;

use crate::config::AppConfig;

pub struct ApiUrls {
    pub user_service_url: String,
}

impl ApiUrls {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            user_service_url: config.services.user_service_url.clone(),
        }
    }
}
