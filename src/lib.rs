//! In-memory cache and subscription engine over a hierarchical graph.
//!
//! - [`CacheTree`]: weighted subscription tree per datamodel, tracking which
//!   graph nodes are cached and which callbacks fire on their changes
//! - [`KeyScheduler`]: per-key FIFO mutual exclusion used to serialize
//!   callbacks on the same link
//! - [`HandleRegistry`]: opaque `u64` handles for in-memory objects
//! - [`LinkIterator`]: read-only cursor over cached graph nodes
//! - [`DiagnosticsRegistry`] and [`start_server`]: read-only HTTP view of
//!   live caches

mod config;
mod constants;
mod diagnostics;
mod errors;
mod handle;
mod link;
mod metrics;
mod path;
mod scheduler;
mod subtree;

pub use config::*;
pub use constants::*;
pub use diagnostics::*;
pub use errors::*;
pub use handle::*;
pub use link::*;
pub use metrics::init_metrics;
pub use metrics::start_server as start_metrics_server;
pub use path::*;
pub use scheduler::*;
pub use subtree::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
