use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde::Serialize;
use tracing::trace;

use super::LinkCallback;
use super::NodeCallback;

/// Fetch status of one object tracked by a tree node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedNodeData {
    /// A fetch has been issued to the backing store
    #[serde(rename = "NodeRequested")]
    pub requested: bool,
    /// The object is currently materialized in the cache
    #[serde(rename = "NodeInCache")]
    pub in_cache: bool,
}

impl CachedNodeData {
    pub fn cached() -> Self {
        Self {
            requested: false,
            in_cache: true,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    weight: u32,
    depth: u32,
}

type Children = BTreeMap<String, BTreeMap<String, Arc<SubscriptionNode>>>;

/// One `(type, key)` position of the subscription tree.
///
/// Counters, callbacks, cached objects and children sit behind separate
/// locks. Only [`inc_weight`](Self::inc_weight) spans two of them: the
/// cached-object read on a 0→1 transition happens under the counter lock.
///
/// Lock order is parent before child and counters before cached objects.
/// Walks clone the child `Arc` and release the parent before touching the
/// child, except [`remove_child_if_empty`](Self::remove_child_if_empty),
/// which has to inspect the child while it holds the parent's children lock.
#[derive(Default)]
pub struct SubscriptionNode {
    counters: RwLock<Counters>,
    node_callbacks: RwLock<Vec<NodeCallback>>,
    link_callbacks: RwLock<HashMap<String, Vec<LinkCallback>>>,
    cached_objects: RwLock<BTreeMap<String, CachedNodeData>>,
    children: RwLock<Children>,
}

impl fmt::Debug for SubscriptionNode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionNode")
            .field("weight", &self.weight())
            .field("depth", &self.depth())
            .field("node_callbacks", &self.node_callback_count())
            .field("link_callbacks", &self.link_callback_count())
            .field("cached_objects", &self.cached_object_ids())
            .finish()
    }
}

impl SubscriptionNode {
    pub fn new() -> Self {
        Self::default()
    }

    // -
    // Weight and depth

    /// Adds one subscriber. On the 0→1 transition returns the ids cached
    /// here at that moment; otherwise returns nothing.
    pub fn inc_weight(&self) -> Vec<String> {
        let mut counters = self.counters.write();
        counters.weight += 1;
        if counters.weight == 1 {
            self.cached_object_ids()
        } else {
            Vec::new()
        }
    }

    /// Removes one subscriber, never going below zero. Does not detach the
    /// node.
    pub fn dec_weight(&self) {
        let mut counters = self.counters.write();
        counters.weight = counters.weight.saturating_sub(1);
    }

    pub fn init_weight(&self) {
        self.counters.write().weight = 1;
    }

    pub fn weight(&self) -> u32 {
        self.counters.read().weight
    }

    pub fn depth(&self) -> u32 {
        self.counters.read().depth
    }

    pub fn set_depth(
        &self,
        depth: u32,
    ) {
        self.counters.write().depth = depth;
    }

    // -
    // Children

    /// Adds a subscriber to the child `(node_type, key)`, creating it with
    /// weight 1 when absent. Returns the child's replay ids as
    /// [`inc_weight`](Self::inc_weight) does.
    pub fn inc_child_weight(
        &self,
        node_type: &str,
        key: &str,
    ) -> Vec<String> {
        loop {
            let child = {
                let mut children = self.children.write();
                let keys = children.entry(node_type.to_string()).or_default();
                match keys.get(key) {
                    Some(child) => child.clone(),
                    None => {
                        let child = Arc::new(SubscriptionNode::new());
                        child.init_weight();
                        keys.insert(key.to_string(), child);
                        return Vec::new();
                    }
                }
            };

            let replay = child.inc_weight();
            if self.is_attached(node_type, key, &child) {
                return replay;
            }
            // Pruned between lookup and increment; the detached copy was empty.
            trace!(node_type, key, "child pruned during inc_child_weight, retrying");
        }
    }

    /// Returns the child `(node_type, key)`, creating an empty one if absent.
    pub fn add_child(
        &self,
        node_type: &str,
        key: &str,
    ) -> Arc<SubscriptionNode> {
        self.children
            .write()
            .entry(node_type.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Detaches the child; the last key of a type takes the type with it.
    pub fn del_child(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<Arc<SubscriptionNode>> {
        let mut children = self.children.write();
        let keys = children.get_mut(node_type)?;
        let removed = keys.remove(key);
        if keys.is_empty() {
            children.remove(node_type);
        }
        removed
    }

    /// Detaches the child only if it is [`is_empty`](Self::is_empty), checked
    /// under this node's children lock. Returns whether it was removed.
    pub fn remove_child_if_empty(
        &self,
        node_type: &str,
        key: &str,
    ) -> bool {
        let mut children = self.children.write();
        let Some(keys) = children.get_mut(node_type) else {
            return false;
        };
        match keys.get(key) {
            Some(child) if child.is_empty() => {
                keys.remove(key);
                if keys.is_empty() {
                    children.remove(node_type);
                }
                true
            }
            _ => false,
        }
    }

    pub fn child(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<Arc<SubscriptionNode>> {
        self.children.read().get(node_type)?.get(key).cloned()
    }

    pub fn is_type_known(
        &self,
        node_type: &str,
    ) -> bool {
        self.children.read().contains_key(node_type)
    }

    pub fn child_keys_for_type(
        &self,
        node_type: &str,
    ) -> Vec<String> {
        self.children
            .read()
            .get(node_type)
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Visits every child. The children map is snapshotted first, so `f` may
    /// edit this node.
    pub fn for_each_child(
        &self,
        mut f: impl FnMut(&str, &str, &Arc<SubscriptionNode>),
    ) {
        for (node_type, key, child) in self.children_snapshot() {
            f(&node_type, &key, &child);
        }
    }

    fn children_snapshot(&self) -> Vec<(String, String, Arc<SubscriptionNode>)> {
        self.children
            .read()
            .iter()
            .flat_map(|(t, keys)| {
                keys.iter()
                    .map(move |(k, child)| (t.clone(), k.clone(), child.clone()))
            })
            .collect()
    }

    fn is_attached(
        &self,
        node_type: &str,
        key: &str,
        child: &Arc<SubscriptionNode>,
    ) -> bool {
        self.child(node_type, key)
            .is_some_and(|current| Arc::ptr_eq(&current, child))
    }

    // -
    // Cached objects

    pub fn add_cached_object(
        &self,
        id: impl Into<String>,
        data: CachedNodeData,
    ) {
        self.cached_objects.write().insert(id.into(), data);
    }

    pub fn remove_cached_object(
        &self,
        id: &str,
    ) -> Option<CachedNodeData> {
        self.cached_objects.write().remove(id)
    }

    pub fn for_each_cached_object(
        &self,
        mut f: impl FnMut(&str, &CachedNodeData),
    ) {
        let snapshot: Vec<(String, CachedNodeData)> = self
            .cached_objects
            .read()
            .iter()
            .map(|(id, data)| (id.clone(), *data))
            .collect();
        for (id, data) in &snapshot {
            f(id, data);
        }
    }

    pub fn cached_object_ids(&self) -> Vec<String> {
        self.cached_objects.read().keys().cloned().collect()
    }

    pub(crate) fn cached_objects(&self) -> BTreeMap<String, CachedNodeData> {
        self.cached_objects.read().clone()
    }

    // -
    // Callbacks

    pub fn register_node_callback(
        &self,
        cb: NodeCallback,
    ) {
        self.node_callbacks.write().push(cb);
    }

    pub fn register_link_callback(
        &self,
        dest_type: impl Into<String>,
        cb: LinkCallback,
    ) {
        self.link_callbacks
            .write()
            .entry(dest_type.into())
            .or_default()
            .push(cb);
    }

    /// Visits node callbacks in registration order. The list is cloned
    /// first, so a callback may register further callbacks.
    pub fn for_each_node_callback(
        &self,
        mut f: impl FnMut(&NodeCallback),
    ) {
        let callbacks = self.node_callbacks.read().clone();
        callbacks.iter().for_each(|cb| f(cb));
    }

    pub fn for_each_link_callback(
        &self,
        dest_type: &str,
        mut f: impl FnMut(&LinkCallback),
    ) {
        let callbacks = self
            .link_callbacks
            .read()
            .get(dest_type)
            .cloned()
            .unwrap_or_default();
        callbacks.iter().for_each(|cb| f(cb));
    }

    pub fn node_callback_count(&self) -> usize {
        self.node_callbacks.read().len()
    }

    /// Number of destination types with at least one link callback.
    pub fn link_callback_count(&self) -> usize {
        self.link_callbacks.read().len()
    }

    pub fn has_link_callbacks_for(
        &self,
        dest_type: &str,
    ) -> bool {
        self.link_callbacks.read().contains_key(dest_type)
    }

    /// True when nothing refers to this node any more and its parent may
    /// drop it.
    pub fn is_empty(&self) -> bool {
        let counters_empty = {
            let counters = self.counters.read();
            counters.weight == 0 && counters.depth == 0
        };
        counters_empty
            && self.node_callbacks.read().is_empty()
            && self.link_callbacks.read().is_empty()
            && self.cached_objects.read().is_empty()
            && self.children.read().is_empty()
    }

    // -
    // Introspection

    pub(crate) fn dump(&self) -> NodeDump {
        let mut child = BTreeMap::new();
        for (node_type, key, node) in self.children_snapshot() {
            child.insert(format!("{}.{}", node_type, key), node.dump());
        }
        let counters = {
            let c = self.counters.read();
            (c.weight, c.depth)
        };
        NodeDump {
            weight: counters.0,
            depth: counters.1,
            cached_nodes: self.cached_objects(),
            cbfn_node_count: self.node_callback_count(),
            cbfn_link_count: self.link_callback_count(),
            child,
        }
    }

    pub(crate) fn describe(
        &self,
        label: &str,
        indent: usize,
        lines: &mut Vec<String>,
    ) {
        lines.push(format!(
            "{}{} weight={} depth={} callbacks={} cached={:?}",
            "\t".repeat(indent),
            label,
            self.weight(),
            self.depth(),
            self.node_callback_count() + self.link_callback_count(),
            self.cached_object_ids(),
        ));
        for (node_type, key, node) in self.children_snapshot() {
            node.describe(&format!("{}.{}", node_type, key), indent + 1, lines);
        }
    }
}

/// Copy-out view of one node and its descendants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct NodeDump {
    pub weight: u32,
    pub depth: u32,
    pub cached_nodes: BTreeMap<String, CachedNodeData>,
    #[serde(rename = "cbfnNodeCount")]
    pub cbfn_node_count: usize,
    #[serde(rename = "cbfnLinkCount")]
    pub cbfn_link_count: usize,
    pub child: BTreeMap<String, NodeDump>,
}
