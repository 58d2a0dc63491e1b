//! Configuration management for the cache engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`DMCACHE__` prefix)
//! - Component-wise validation
mod cache;
mod diagnostics;
mod monitoring;
pub use cache::*;
pub use diagnostics::*;
pub use monitoring::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const ENV_PREFIX: &str = "DMCACHE";

/// Main configuration container for the cache engine
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Cache tree behaviour
    #[serde(default)]
    pub cache: CacheTreeConfig,
    /// Diagnostics HTTP endpoint
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// Prometheus metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Debug for CacheConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field("cache", &self.cache)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl CacheConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DMCACHE__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so callers can keep layering overrides with
    /// [`with_override_config`](Self::with_override_config). Call
    /// [`validate`](Self::validate) before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DMCACHE__DIAGNOSTICS__PORT", "7000");
    /// let cfg = CacheConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.diagnostics.validate()?;
        self.monitoring.validate()?;

        if self.diagnostics.enabled
            && self.monitoring.prometheus_enabled
            && self.diagnostics.port == self.monitoring.prometheus_port
        {
            return Err(Error::Config(ConfigError::Message(format!(
                "diagnostics and prometheus servers both configured on port {}",
                self.diagnostics.port
            ))));
        }
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
