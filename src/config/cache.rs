use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Behaviour switches for a datamodel cache tree
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CacheTreeConfig {
    /// Treat every path as subscribed.
    ///
    /// Used by processes that mirror the whole graph; `check_path` then
    /// short-circuits to `true`.
    ///
    /// **Default**: false
    #[serde(default)]
    pub fetch_all: bool,
}

impl CacheTreeConfig {
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}
