//! Opaque handle registry
//!
//! Maps stable `u64` handles to in-memory objects so they can be referenced
//! across module or process boundaries without holding the object itself.
//!
//! Handles are issued monotonically starting at 1 and never reused. Values
//! live in one of [`HANDLE_SHARDS`](crate::constants::HANDLE_SHARDS) shards
//! chosen by `handle % HANDLE_SHARDS`, so no operation ever needs more than
//! one shard lock.
//!
//! Two accessor flavours exist:
//!
//! - [`HandleRegistry::get`] for handles that may legitimately be unknown
//!   (user input, stale references) and returns `Option`.
//! - [`HandleRegistry::get_or_panic`] for handles whose existence is an
//!   invariant of the caller's own logic. A miss there is a bug and panics.

mod registry;


pub use registry::*;
