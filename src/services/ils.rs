//! ILS access service

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    config::MultiBackendConfig,
    error::AppResult,
    models::{ItemBatch, Patron},
    multibackend::{ConfigLoader, DriverManager, FileConfigLoader, MultiBackend},
};

/// Configured backends as reported to clients
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BackendsInfo {
    pub sources: Vec<String>,
    pub default_driver: Option<String>,
    pub login_drivers: Vec<String>,
    pub default_login_driver: String,
}

#[derive(Clone)]
pub struct IlsService {
    config: Arc<MultiBackendConfig>,
    manager: Arc<DriverManager>,
    loader: Arc<dyn ConfigLoader>,
}

impl IlsService {
    pub fn new(
        config: MultiBackendConfig,
        manager: DriverManager,
        loader: Arc<dyn ConfigLoader>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            manager: Arc::new(manager),
            loader,
        }
    }

    /// Service reading driver configuration from `config_dir`, with the
    /// built-in drivers registered
    pub fn from_config(config: MultiBackendConfig) -> Self {
        let loader = Arc::new(FileConfigLoader::new(&config.config_dir));
        Self::new(config, DriverManager::with_builtin(), loader)
    }

    /// Fresh router for one request
    pub fn router(&self) -> MultiBackend {
        MultiBackend::new(self.config.clone(), self.manager.clone(), self.loader.clone())
    }

    /// Router that knows the caller's catalog credentials
    pub fn router_for(&self, patron: Option<Patron>) -> MultiBackend {
        self.router().with_stored_patron(patron)
    }

    pub fn backends(&self) -> BackendsInfo {
        BackendsInfo {
            sources: self.config.drivers.keys().cloned().collect(),
            default_driver: self.config.default_driver.clone(),
            login_drivers: self.config.login.drivers.clone(),
            default_login_driver: self.config.default_login_driver(),
        }
    }

    /// Cancel holds as listed by `get_my_holds`
    pub async fn cancel_holds(&self, patron: Patron, holds: &[Value]) -> AppResult<Value> {
        let mut router = self.router_for(Some(patron.clone()));
        let mut details = Vec::with_capacity(holds.len());
        for hold in holds {
            details.push(router.get_cancel_hold_details(hold, Some(&patron)).await?);
        }
        tracing::debug!("Cancelling {} holds for {}", details.len(), patron.cat_username);
        router.cancel_holds(&ItemBatch::new(patron, details)).await
    }

    /// Renew loans as listed by `get_my_transactions`
    pub async fn renew(&self, patron: Patron, checkouts: &[Value]) -> AppResult<Value> {
        let mut router = self.router_for(Some(patron.clone()));
        let mut details = Vec::with_capacity(checkouts.len());
        for checkout in checkouts {
            details.push(router.get_renew_details(checkout).await?);
        }
        tracing::debug!("Renewing {} loans for {}", details.len(), patron.cat_username);
        router.renew_my_items(&ItemBatch::new(patron, details)).await
    }
}
