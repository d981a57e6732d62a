use super::{evolution::RunConfig, runtime::RuntimeConfig, traits::ConfigSection};
use crate::error::EvolveError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix for environment overrides, e.g. `TRAIL_EVOLVE__RUN__GENERATIONS=50`.
pub const ENV_PREFIX: &str = "TRAIL_EVOLVE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvolveError> {
        self.run.validate()?;
        self.runtime.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Loads a TOML file layered with environment overrides, then validates.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvolveError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(EvolveError::Configuration(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        self.replace(config)
    }

    pub fn load_from_str(&self, contents: &str) -> Result<(), EvolveError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        self.replace(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvolveError> {
        let config = self.get()?;
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| EvolveError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| EvolveError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> Result<AppConfig, EvolveError> {
        self.config
            .read()
            .map(|c| c.clone())
            .map_err(|_| EvolveError::Configuration("config lock poisoned".to_string()))
    }

    pub fn update<F>(&self, f: F) -> Result<(), EvolveError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.get()?;
        f(&mut candidate);
        candidate.validate()?;
        self.replace(candidate)
    }

    fn replace(&self, config: AppConfig) -> Result<(), EvolveError> {
        let mut guard = self
            .config
            .write()
            .map_err(|_| EvolveError::Configuration("config lock poisoned".to_string()))?;
        *guard = config;
        Ok(())
    }
}
