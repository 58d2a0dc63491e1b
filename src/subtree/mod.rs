//! Subscription tree.
//!
//! A [`SubscriptionNode`] sits at one `(type, key)` position and counts the
//! subscribers attached there, remembers which objects are cached under it and
//! holds the callbacks registered for it. A [`CacheTree`] owns one forest of
//! such nodes per datamodel and drives them by path.
//!
//! # Locking
//!
//! Each node guards its fields with separate locks and most operations take
//! one lock at a time. Pruning is the exception: the emptiness of a child is
//! checked while the parent's children lock is held, so the check and the
//! removal are atomic. Locks are always taken parent first, then child.

mod event;
mod node;
mod tree;

#[cfg(test)]
mod node_test;

pub use event::*;
pub use node::*;
pub use tree::*;
