//! Driver construction and per-router caching

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use config::{Config, ConfigError, File};
use serde_json::Value;

use crate::{
    config::MultiBackendConfig,
    drivers::{DemoDriver, Driver, DriverConfig},
    error::{AppError, AppResult},
};

type DriverConstructor = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Registry of driver types by name
#[derive(Clone, Default)]
pub struct DriverManager {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager knowing the drivers shipped with the gateway
    pub fn with_builtin() -> Self {
        let mut manager = Self::new();
        manager.register("Demo", || Box::new(DemoDriver::new()));
        manager
    }

    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Driver> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn has(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Construct an unconfigured driver of the named type
    pub fn build(&self, name: &str) -> Option<Box<dyn Driver>> {
        self.constructors.get(name).map(|constructor| constructor())
    }
}

impl fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverManager")
            .field("drivers", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Loads the configuration blob of one source
#[cfg_attr(test, mockall::automock)]
pub trait ConfigLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<DriverConfig, ConfigError>;
}

/// Reads driver configuration files (`.toml`, `.yaml`, `.json`, `.ini`)
/// below a base directory
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    base_dir: PathBuf,
}

impl FileConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self, path: &str) -> Result<DriverConfig, ConfigError> {
        let file = self.base_dir.join(path);
        Config::builder()
            .add_source(File::with_name(&file.to_string_lossy()))
            .build()?
            .try_deserialize()
    }
}

/// In-memory configuration, keyed by the same path a file loader would read
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    configs: HashMap<String, DriverConfig>,
}

impl StaticConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, config: DriverConfig) -> Self {
        self.configs.insert(path.into(), config);
        self
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, path: &str) -> Result<DriverConfig, ConfigError> {
        self.configs
            .get(path)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(path.to_string()))
    }
}

/// Resolves sources to initialised drivers, at most once per source
///
/// A source that cannot be served (no registry entry, unknown driver type,
/// missing or empty configuration) is remembered as `None` so the lookup is
/// not repeated. A failing `init` is reported to the caller and not
/// remembered.
pub struct DriverFactory {
    config: Arc<MultiBackendConfig>,
    manager: Arc<DriverManager>,
    loader: Arc<dyn ConfigLoader>,
    cache: HashMap<String, Option<Arc<dyn Driver>>>,
}

impl DriverFactory {
    pub fn new(
        config: Arc<MultiBackendConfig>,
        manager: Arc<DriverManager>,
        loader: Arc<dyn ConfigLoader>,
    ) -> Self {
        Self {
            config,
            manager,
            loader,
            cache: HashMap::new(),
        }
    }

    /// Whether `source` names a configured backend
    pub fn is_registered(&self, source: &str) -> bool {
        self.config.drivers.contains_key(source)
    }

    /// Substitute the default backend for an empty source
    pub fn resolve_source<'a>(&'a self, source: &'a str) -> &'a str {
        if source.is_empty() {
            if let Some(default) = self.config.default_driver.as_deref() {
                tracing::debug!("Using default driver {}", default);
                return default;
            }
        }
        source
    }

    pub async fn get_driver(&mut self, source: &str) -> AppResult<Option<Arc<dyn Driver>>> {
        let source = self.resolve_source(source).to_string();
        if let Some(cached) = self.cache.get(&source) {
            return Ok(cached.clone());
        }
        let driver = self.create_driver(&source).await?;
        self.cache.insert(source, driver.clone());
        Ok(driver)
    }

    /// Whether a lookup for `source` has already been settled
    pub fn is_cached(&self, source: &str) -> bool {
        self.cache.contains_key(source)
    }

    async fn create_driver(&self, source: &str) -> AppResult<Option<Arc<dyn Driver>>> {
        let Some(driver_type) = self.config.drivers.get(source) else {
            tracing::warn!("No configuration found for source '{}'", source);
            return Ok(None);
        };

        let Some(driver_config) = self.driver_config(source) else {
            return Ok(None);
        };

        let Some(mut driver) = self.manager.build(driver_type) else {
            tracing::warn!("Unknown driver type '{}' for source '{}'", driver_type, source);
            return Ok(None);
        };

        driver.set_config(driver_config);
        driver.init().await.map_err(|e| AppError::DriverInit {
            backend: source.to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!("Initialised {} driver for source '{}'", driver_type, source);
        Ok(Some(Arc::from(driver)))
    }

    fn driver_config(&self, source: &str) -> Option<DriverConfig> {
        let path = match self.config.drivers_config_path.as_deref() {
            Some(dir) if !dir.is_empty() => format!("{}/{}", dir, source),
            _ => source.to_string(),
        };
        match self.loader.load(&path) {
            Ok(config) if !is_empty_config(&config) => Some(config),
            Ok(_) => {
                tracing::warn!("Empty config for source '{}'", source);
                None
            }
            Err(e) => {
                tracing::warn!("Could not load config for {}: {}", source, e);
                None
            }
        }
    }
}

fn is_empty_config(config: &Value) -> bool {
    match config {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
