use super::{evolution::EvolutionConfig, search::SearchConfig, traits::ConfigSection};
use crate::error::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Environment prefix; `PIPEVO__SEARCH__N_JOBS=4` sets `search.n_jobs`.
pub const ENV_PREFIX: &str = "PIPEVO";

const DEFAULT_FILE: &str = "pipevo";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub evolution: EvolutionConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.evolution.validate()?;
        Ok(())
    }
}

/// Load configuration from, in increasing priority: `pipevo.toml` in the
/// working directory, `path` when given, and `PIPEVO__*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = config::Config::builder();

    if Path::new(&format!("{}.toml", DEFAULT_FILE)).exists() {
        builder = builder.add_source(config::File::with_name(DEFAULT_FILE).required(false));
    }
    if let Some(path) = path {
        debug!("Loading configuration from {}", path.display());
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Shared, validated configuration.
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;

        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = {
            let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
            toml::to_string_pretty(&*config)?
        };
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply `f` and keep the result only if it validates.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let mut updated = config.clone();
        f(&mut updated);
        updated.validate()?;
        *config = updated;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
