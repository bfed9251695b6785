//! ILS Gateway
//!
//! Routes library-system requests across several independently configured
//! backends. Identifiers are namespaced per backend (`source.localId`) so
//! records and patrons of one backend never reach another.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod drivers;
pub mod error;
pub mod models;
pub mod multibackend;
pub mod namespace;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
