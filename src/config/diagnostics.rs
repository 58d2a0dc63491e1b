use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::constants::DEFAULT_DIAGNOSTICS_PORT;
use crate::constants::DEFAULT_DIAGNOSTICS_PREFIX;
use crate::Error;
use crate::Result;

/// Read-only HTTP endpoint exposing the live cache trees
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    /// Start the diagnostics server at all
    ///
    /// **Default**: false
    #[serde(default = "default_diagnostics_enabled")]
    pub enabled: bool,

    /// Address the server binds to
    ///
    /// **Default**: "0.0.0.0"
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// **Default**: 6000
    #[serde(default = "default_port")]
    pub port: u16,

    /// Route served under `/debug/`, slash separated (e.g. `nexus/dm`)
    ///
    /// **Default**: "nexus/dm"
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_diagnostics_enabled(),
            listen_address: default_listen_address(),
            port: default_port(),
            path_prefix: default_path_prefix(),
        }
    }
}

impl DiagnosticsConfig {
    /// Validates diagnostics configuration
    /// # Errors
    /// Returns `Error::Config` when:
    /// - the server is enabled on port 0
    /// - the listen address does not parse as an IP address
    /// - the path prefix is empty or has empty segments
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.port == 0 {
            return Err(Error::Config(ConfigError::Message(
                "diagnostics.port cannot be 0 when enabled".into(),
            )));
        }

        if self.listen_address.parse::<std::net::IpAddr>().is_err() {
            return Err(Error::Config(ConfigError::Message(format!(
                "diagnostics.listen_address {} is not an IP address",
                self.listen_address
            ))));
        }

        if self.segments().is_empty() || self.path_prefix.split('/').any(|s| s.is_empty()) {
            return Err(Error::Config(ConfigError::Message(format!(
                "diagnostics.path_prefix '{}' must be non-empty slash separated segments",
                self.path_prefix
            ))));
        }

        if !self.enabled && self.port != default_port() {
            warn!(
                "diagnostics.port configured to {} but diagnostics is disabled",
                self.port
            );
        }

        Ok(())
    }

    /// Path segments under `/debug`
    pub fn segments(&self) -> Vec<String> {
        self.path_prefix
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn default_diagnostics_enabled() -> bool {
    false
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_DIAGNOSTICS_PORT
}

fn default_path_prefix() -> String {
    DEFAULT_DIAGNOSTICS_PREFIX.to_string()
}
