use std::sync::Arc;

use crate::config::Config;
use crate::db::database::Database;
use crate::llm::{AdviceModel, ImageGenerator};

/// Per-request knobs copied out of [`Config`] at startup.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub default_body_type: String,
    pub upload_max_bytes: usize,
    pub upload_max_dimension: u32,
}

impl RequestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_body_type: config.default_body_type.clone(),
            upload_max_bytes: config.upload_max_bytes,
            upload_max_dimension: config.upload_max_dimension,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub advice: Arc<dyn AdviceModel>,
    pub images: Arc<dyn ImageGenerator>,
    pub settings: Arc<RequestSettings>,
}

impl AppState {
    pub fn new(
        db: Database,
        advice: Arc<dyn AdviceModel>,
        images: Arc<dyn ImageGenerator>,
        settings: RequestSettings,
    ) -> Self {
        AppState {
            db,
            advice,
            images,
            settings: Arc::new(settings),
        }
    }
}
