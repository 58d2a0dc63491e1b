//! Cache Error Hierarchy
//!
//! Splits failures by who is at fault: configuration, the client asking the
//! diagnostics surface, encoding, or a broken internal invariant.
//!
//! Programmer errors on trusted lookups (see
//! [`HandleRegistry::get_or_panic`](crate::HandleRegistry::get_or_panic)) do
//! not appear here; they panic.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lookup of something that may legitimately be absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed client input (diagnostics requests)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON encoding of a cache dump failed
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// A recorded subscription no longer matches the tree structure
    #[error("Subscription tree invariant violated: {0}")]
    TreeInvariant(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether the failure is attributable to the caller's input rather than
    /// to the cache itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidRequest(_))
    }
}
