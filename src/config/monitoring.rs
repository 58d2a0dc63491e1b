use std::net::IpAddr;
use std::net::SocketAddr;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::constants::DEFAULT_PROMETHEUS_PORT;
use crate::Error;
use crate::Result;

/// Standalone Prometheus endpoint.
///
/// The diagnostics server serves `/metrics` as well; this one exists for
/// deployments that scrape metrics without exposing cache dumps.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// **Default**: false
    #[serde(default)]
    pub prometheus_enabled: bool,

    /// **Default**: "0.0.0.0"
    #[serde(default = "default_metrics_address")]
    pub prometheus_listen_address: String,

    /// **Default**: 8080
    #[serde(default = "default_metrics_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_listen_address: default_metrics_address(),
            prometheus_port: default_metrics_port(),
        }
    }
}

impl MonitoringConfig {
    /// Address the metrics server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.prometheus_listen_address.parse().map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "monitoring.prometheus_listen_address {}: {}",
                self.prometheus_listen_address, e
            )))
        })?;
        Ok(SocketAddr::new(ip, self.prometheus_port))
    }

    /// # Errors
    /// `Error::Config` for an unparsable listen address, and, when enabled,
    /// for port 0 or a privileged port.
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        match (self.prometheus_enabled, self.prometheus_port) {
            (true, 0) => Err(Error::Config(ConfigError::Message(
                "monitoring.prometheus_port cannot be 0 when enabled".into(),
            ))),
            (true, port) if port < 1024 => Err(Error::Config(ConfigError::Message(format!(
                "monitoring.prometheus_port {} requires root",
                port
            )))),
            (false, port) if port != DEFAULT_PROMETHEUS_PORT => {
                warn!(port, "prometheus port set while monitoring is disabled");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_port() -> u16 {
    DEFAULT_PROMETHEUS_PORT
}
