//! Read-only cursors over backing-store nodes.
//!
//! The cache never looks at how the backing store represents edges. It asks a
//! [`BackingNode`] for its identity, parent, properties and cached links, and
//! walks the answers through [`LinkIterator`].
//!
//! [`MemNode`] is a self-contained in-memory backing node used by tests and by
//! embedders that keep the graph in process.

mod iterator;
mod mem;


use std::collections::BTreeMap;
use std::sync::Arc;

pub use iterator::*;
pub use mem::*;

/// Node and link properties
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// An edge as the backing store reports it, seen from the node it was
/// listed on.
///
/// The peer is the node at the other end: the child for a child link, the
/// linking node for a reverse link. It is always the node a
/// [`LinkIterator`] built from the link is positioned on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Link {
    pub peer_type: String,
    pub peer_key: String,
    /// Backing-store id of the peer
    pub peer_id: String,
    pub properties: PropertyMap,
}

/// Narrow view of a backing-store node
///
/// Implementations are expected to answer from their local cache; none of
/// these calls may block on I/O.
pub trait BackingNode: Send + Sync {
    fn id(&self) -> &str;

    fn node_type(&self) -> &str;

    fn key_value(&self) -> &str;

    /// `None` at the root of the graph
    fn parent(&self) -> Option<Arc<dyn BackingNode>>;

    fn properties(&self) -> PropertyMap;

    /// Visits cached parent-to-child links, optionally only those whose
    /// destination has type `node_type`.
    fn for_each_cached_child_link(
        &self,
        node_type: Option<&str>,
        f: &mut dyn FnMut(LinkIterator),
    );

    /// Visits cached reverse links (nodes that link to this one).
    fn for_each_cached_reverse_link(
        &self,
        node_type: Option<&str>,
        f: &mut dyn FnMut(LinkIterator),
    );

    fn cached_child_link(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<LinkIterator>;

    fn cached_reverse_link(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<LinkIterator>;
}
