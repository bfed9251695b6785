//! Business logic services

pub mod ils;

use crate::config::AppConfig;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub ils: ils::IlsService,
}

impl Services {
    pub fn new(ils: ils::IlsService) -> Self {
        Self { ils }
    }

    /// Create all services from the application configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(ils::IlsService::from_config(config.multibackend.clone()))
    }
}
