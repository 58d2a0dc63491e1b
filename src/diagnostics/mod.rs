//! Read-only diagnostics surface.
//!
//! Live caches register themselves with a [`DiagnosticsRegistry`] under an
//! id. The HTTP server lists them and returns a JSON snapshot of one cache on
//! request. Nothing served here can mutate a cache.

mod registry;
mod server;

#[cfg(test)]
mod server_test;

pub use registry::*;
pub use server::*;
