use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::properties_differ;
use super::CachedNodeData;
use super::LinkCallback;
use super::LinkEvent;
use super::NodeCallback;
use super::NodeDump;
use super::NodeEvent;
use super::SubscriptionNode;
use super::UpdateType;
use crate::config::CacheTreeConfig;
use crate::constants::LINK_BOOKKEEPING_PROPERTIES;
use crate::constants::NODE_BOOKKEEPING_PROPERTIES;
use crate::constants::WILDCARD_KEY;
use crate::diagnostics::CacheSource;
use crate::link::LinkIterator;
use crate::metrics::DISPATCHED_CALLBACKS_METRIC;
use crate::metrics::SUBSCRIPTIONS_METRIC;
use crate::Error;
use crate::KeyScheduler;
use crate::NodePath;
use crate::Result;

/// Callback attached at the final node of a subscription walk
enum Registration {
    Node(NodeCallback),
    Link(String, LinkCallback),
}

/// State shared by every step of one subscription walk
struct Walk<'a> {
    path: &'a NodePath,
    depth: u32,
    registration: Option<&'a Registration>,
    sync: BTreeSet<String>,
}

#[derive(Serialize)]
struct TreeDump {
    subtree: BTreeMap<String, NodeDump>,
    #[serde(rename = "subList")]
    sub_list: BTreeMap<String, u32>,
}

/// Subscription forest of one datamodel instance.
///
/// Roots are keyed by the type of a path's first segment; the key of that
/// segment is not part of the tree. Subscriptions made with a non-zero depth
/// are recorded so they can be undone with [`unsubscribe`](Self::unsubscribe).
pub struct CacheTree {
    name: String,
    fetch_all: bool,
    roots: DashMap<String, Arc<SubscriptionNode>>,
    sub_list: DashMap<NodePath, u32>,
    scheduler: KeyScheduler,
}

impl std::fmt::Debug for CacheTree {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CacheTree")
            .field("name", &self.name)
            .field("fetch_all", &self.fetch_all)
            .field("roots", &self.roots.len())
            .field("subscriptions", &self.sub_list.len())
            .finish()
    }
}

impl CacheTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, &CacheTreeConfig::default())
    }

    pub fn with_config(
        name: impl Into<String>,
        config: &CacheTreeConfig,
    ) -> Self {
        Self {
            name: name.into(),
            fetch_all: config.fetch_all,
            roots: DashMap::new(),
            sub_list: DashMap::new(),
            scheduler: KeyScheduler::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scheduler that serializes link dispatch; callers may share it for
    /// their own per-link critical sections.
    pub fn scheduler(&self) -> &KeyScheduler {
        &self.scheduler
    }

    pub fn root(
        &self,
        node_type: &str,
    ) -> Option<Arc<SubscriptionNode>> {
        self.roots.get(node_type).map(|r| r.value().clone())
    }

    /// Node at `path`, if the tree has one.
    pub fn node(
        &self,
        path: &NodePath,
    ) -> Option<Arc<SubscriptionNode>> {
        let (first, rest) = path.segments().split_first()?;
        let mut cur = self.root(&first.node_type)?;
        for seg in rest {
            cur = cur.child(&seg.node_type, &seg.key)?;
        }
        Some(cur)
    }

    // -
    // Weights

    /// Adds a subscriber to the node at `path`, creating the branch as
    /// needed. Returns the node's cached ids on its 0→1 transition.
    pub fn inc_weight(
        &self,
        path: &NodePath,
    ) -> Vec<String> {
        let Some((first, rest)) = path.segments().split_first() else {
            return Vec::new();
        };

        loop {
            let root = self.root_or_create(&first.node_type);
            let Some((last, middle)) = rest.split_last() else {
                return root.inc_weight();
            };

            let mut parent = root;
            for seg in middle {
                parent = parent.add_child(&seg.node_type, &seg.key);
            }
            let replay = parent.inc_child_weight(&last.node_type, &last.key);

            let target = parent.child(&last.node_type, &last.key);
            match (target, self.node(path)) {
                (Some(target), Some(attached)) if Arc::ptr_eq(&target, &attached) => return replay,
                (target, _) => {
                    if let Some(target) = target {
                        target.dec_weight();
                    }
                    trace!(dm = %self.name, %path, "branch pruned while subscribing, retrying");
                }
            }
        }
    }

    /// Removes a subscriber from the node at `path` and prunes the branch if
    /// it is left empty. Returns whether the node existed.
    pub fn dec_weight(
        &self,
        path: &NodePath,
    ) -> bool {
        let Some(node) = self.node(path) else {
            return false;
        };
        node.dec_weight();
        self.prune(path);
        true
    }

    // -
    // Subscriptions

    /// Subscribes to `path` and returns the ids already cached that the new
    /// subscriber has to be synced with.
    ///
    /// A non-zero `depth` records the subscription; subscribing the same path
    /// with a depth twice is refused and yields an empty list.
    pub fn subscribe(
        &self,
        path: &NodePath,
        depth: u32,
    ) -> Vec<String> {
        self.add_subscription(path, depth, None)
    }

    /// Subscribes `cb` to node events at `path`. The returned ids also cover
    /// objects the callback has to be replayed with.
    pub fn subscribe_node(
        &self,
        path: &NodePath,
        cb: NodeCallback,
    ) -> Vec<String> {
        self.add_subscription(path, 0, Some(Registration::Node(cb)))
    }

    /// Subscribes `cb` to events on links from nodes at `path` to nodes of
    /// `dest_type`.
    pub fn subscribe_link(
        &self,
        path: &NodePath,
        dest_type: &str,
        cb: LinkCallback,
    ) -> Vec<String> {
        self.add_subscription(path, 0, Some(Registration::Link(dest_type.to_string(), cb)))
    }

    fn add_subscription(
        &self,
        path: &NodePath,
        depth: u32,
        registration: Option<Registration>,
    ) -> Vec<String> {
        let Some(first) = path.first() else {
            warn!(dm = %self.name, "ignoring subscription to an empty path");
            return Vec::new();
        };
        debug!(dm = %self.name, %path, depth, "add subscription");

        if depth != 0 {
            match self.sub_list.entry(path.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    error!(dm = %self.name, %path, "path is already subscribed");
                    return Vec::new();
                }
                dashmap::mapref::entry::Entry::Vacant(e) => {
                    e.insert(depth);
                }
            }
            self.update_subscription_metric();
        }

        let root = self.root_or_create(&first.node_type);
        let mut walk = Walk {
            path,
            depth,
            registration: registration.as_ref(),
            sync: root.inc_weight().into_iter().collect(),
        };

        if path.len() == 1 {
            self.finish_walk(&mut walk, None, Some(root), false);
        } else {
            self.walk_step(&mut walk, &root, 1, false);
        }

        trace!(dm = %self.name, sync = ?walk.sync, "sync list");
        walk.sync.into_iter().collect()
    }

    /// One segment of the subscription walk. In `match_only` mode the tree
    /// is inspected but not modified.
    fn walk_step(
        &self,
        walk: &mut Walk<'_>,
        cur: &Arc<SubscriptionNode>,
        idx: usize,
        match_only: bool,
    ) {
        let path = walk.path;
        let segments = path.segments();
        let seg = &segments[idx];
        let last = idx == segments.len() - 1;

        if !match_only {
            walk.sync.extend(cur.inc_child_weight(&seg.node_type, &seg.key));
        } else if cur.weight() == 0 {
            // Nobody keeps this branch in sync; everything here needs a refetch.
            walk.sync.extend(cur.cached_object_ids());
        }

        let next = cur.child(&seg.node_type, &seg.key);
        if next.is_none() && !match_only {
            debug!(dm = %self.name, idx, %path, "node vanished during subscribe");
            return;
        }

        if last {
            self.finish_walk(walk, Some(cur), next, match_only);
            return;
        }

        if seg.is_wildcard() {
            for key in cur.child_keys_for_type(&seg.node_type) {
                if key == WILDCARD_KEY {
                    continue;
                }
                if let Some(sibling) = cur.child(&seg.node_type, &key) {
                    trace!(dm = %self.name, node_type = %seg.node_type, %key, "exploring wildcard match");
                    self.walk_step(walk, &sibling, idx + 1, true);
                }
            }
        }

        let Some(next) = next else {
            return;
        };
        if idx == segments.len() - 2 {
            // Parent of the subscribed nodes is resynced as well.
            walk.sync.extend(next.cached_object_ids());
        }
        self.walk_step(walk, &next, idx + 1, match_only);
    }

    /// Final segment: record depth, attach the callback and collect replay ids.
    fn finish_walk(
        &self,
        walk: &mut Walk<'_>,
        parent: Option<&Arc<SubscriptionNode>>,
        target: Option<Arc<SubscriptionNode>>,
        match_only: bool,
    ) {
        if !match_only && walk.depth != 0 {
            if let Some(target) = &target {
                target.set_depth(walk.depth);
            }
        }

        let Some(registration) = walk.registration else {
            return;
        };

        if let Some(target) = &target {
            if !match_only {
                match registration {
                    Registration::Node(cb) => target.register_node_callback(cb.clone()),
                    Registration::Link(dest_type, cb) => {
                        target.register_link_callback(dest_type.clone(), cb.clone())
                    }
                }
            }
            walk.sync.extend(target.cached_object_ids());
        }

        let path = walk.path;
        let Some(seg) = path.last() else {
            return;
        };
        if let (true, Some(parent)) = (seg.is_wildcard(), parent) {
            parent.for_each_child(|node_type, key, node| {
                if node_type == seg.node_type && key != WILDCARD_KEY {
                    walk.sync.extend(node.cached_object_ids());
                }
            });
        }
    }

    /// Undoes a recorded subscription. Returns `Ok(false)` when `path` was
    /// never subscribed with a depth.
    ///
    /// The branch is located before anything changes, so a
    /// `TreeInvariant` error leaves both the tree and the record untouched.
    pub fn unsubscribe(
        &self,
        path: &NodePath,
    ) -> Result<bool> {
        if !self.sub_list.contains_key(path) {
            debug!(dm = %self.name, %path, "unsubscribe of unknown path");
            return Ok(false);
        }

        let invariant = |step: &str| {
            Error::TreeInvariant(format!("{}: {} while unsubscribing {}", self.name, step, path))
        };

        let (first, rest) = path
            .segments()
            .split_first()
            .ok_or_else(|| invariant("empty path"))?;
        let root = self.root(&first.node_type).ok_or_else(|| invariant("missing root"))?;

        let mut branch = Vec::with_capacity(path.len());
        branch.push(root);
        for seg in rest {
            let Some(cur) = branch.last() else {
                return Err(invariant("empty branch"));
            };
            if !cur.is_type_known(&seg.node_type) {
                return Err(invariant("missing child type"));
            }
            let child = cur
                .child(&seg.node_type, &seg.key)
                .ok_or_else(|| invariant("missing child"))?;
            branch.push(child);
        }

        if self.sub_list.remove(path).is_none() {
            // Lost a race with a concurrent unsubscribe of the same path.
            return Ok(false);
        }
        self.update_subscription_metric();

        for node in &branch {
            node.dec_weight();
        }
        if let Some(target) = branch.last() {
            target.set_depth(0);
        }

        self.prune(path);
        Ok(true)
    }

    /// Whether events at `path` are covered by a subscription: a non-zero
    /// weight on the exact node, or a depth on an ancestor that reaches it.
    pub fn check_path(
        &self,
        path: &NodePath,
    ) -> bool {
        if self.fetch_all {
            return true;
        }
        let Some(first) = path.first() else {
            return false;
        };
        let found = match self.root(&first.node_type) {
            None => false,
            Some(root) if path.len() == 1 => root.weight() != 0 || root.depth() >= 1,
            Some(root) => Self::check_from(path, 1, &root),
        };
        trace!(dm = %self.name, %path, found, "check path");
        found
    }

    fn check_from(
        path: &NodePath,
        idx: usize,
        cur: &SubscriptionNode,
    ) -> bool {
        let remaining = path.len() - idx;
        if idx != 1 && cur.depth() as usize > remaining {
            return true;
        }
        if idx == path.len() {
            return cur.weight() != 0;
        }
        let seg = &path.segments()[idx];
        let exact = cur.child(&seg.node_type, &seg.key);
        if exact.is_some_and(|n| Self::check_from(path, idx + 1, &n)) {
            return true;
        }
        !seg.is_wildcard()
            && cur
                .child(&seg.node_type, WILDCARD_KEY)
                .is_some_and(|n| Self::check_from(path, idx + 1, &n))
    }

    // -
    // Callback lookup

    /// Node callbacks registered on every node matching `path`, trying the
    /// exact key and the wildcard at each step.
    pub fn node_callbacks_for_path(
        &self,
        path: &NodePath,
    ) -> Vec<NodeCallback> {
        let mut found = Vec::new();
        self.for_each_matching_node(path, &mut |node: &SubscriptionNode| {
            node.for_each_node_callback(|cb| found.push(cb.clone()))
        });
        found
    }

    pub fn link_callbacks_for_path(
        &self,
        path: &NodePath,
        dest_type: &str,
    ) -> Vec<LinkCallback> {
        let mut found = Vec::new();
        self.for_each_matching_node(path, &mut |node: &SubscriptionNode| {
            node.for_each_link_callback(dest_type, |cb| found.push(cb.clone()))
        });
        found
    }

    fn for_each_matching_node(
        &self,
        path: &NodePath,
        f: &mut dyn FnMut(&SubscriptionNode),
    ) {
        let Some(first) = path.first() else {
            return;
        };
        if let Some(root) = self.root(&first.node_type) {
            Self::match_from(path, 1, &root, f);
        }
    }

    fn match_from(
        path: &NodePath,
        idx: usize,
        cur: &SubscriptionNode,
        f: &mut dyn FnMut(&SubscriptionNode),
    ) {
        if idx == path.len() {
            f(cur);
            return;
        }
        let seg = &path.segments()[idx];
        if !cur.is_type_known(&seg.node_type) {
            return;
        }
        if let Some(exact) = cur.child(&seg.node_type, &seg.key) {
            Self::match_from(path, idx + 1, &exact, f);
        }
        if !seg.is_wildcard() {
            if let Some(wildcard) = cur.child(&seg.node_type, WILDCARD_KEY) {
                Self::match_from(path, idx + 1, &wildcard, f);
            }
        }
    }

    // -
    // Cached objects

    /// Marks `id` as cached at `path`, creating the nodes on the way.
    pub fn record_object(
        &self,
        path: &NodePath,
        id: &str,
    ) {
        let Some((first, rest)) = path.segments().split_first() else {
            warn!(dm = %self.name, id, "ignoring object with an empty path");
            return;
        };
        trace!(dm = %self.name, %path, id, "record object");

        loop {
            let mut cur = self.root_or_create(&first.node_type);
            for seg in rest {
                cur = cur.add_child(&seg.node_type, &seg.key);
            }
            cur.add_cached_object(id, CachedNodeData::cached());

            // A concurrent prune may have detached part of the branch before
            // the object landed; the node reachable now must be ours.
            match self.node(path) {
                Some(attached) if Arc::ptr_eq(&attached, &cur) => return,
                _ => {
                    cur.remove_cached_object(id);
                    trace!(dm = %self.name, %path, id, "branch pruned while recording, retrying");
                }
            }
        }
    }

    /// Drops the cached mark for `id` at `path` and prunes every node left
    /// empty, bottom-up. Roots stay.
    pub fn forget_object(
        &self,
        path: &NodePath,
        id: &str,
    ) {
        let Some(first) = path.first() else {
            return;
        };
        let Some(root) = self.root(&first.node_type) else {
            return;
        };
        trace!(dm = %self.name, %path, id, "forget object");
        Self::forget_from(&root, path, 1, Some(id));
    }

    /// Removes empty nodes along `path`.
    fn prune(
        &self,
        path: &NodePath,
    ) {
        if let Some(root) = path.first().and_then(|first| self.root(&first.node_type)) {
            Self::forget_from(&root, path, 1, None);
        }
    }

    fn forget_from(
        cur: &SubscriptionNode,
        path: &NodePath,
        idx: usize,
        id: Option<&str>,
    ) {
        if idx >= path.len() {
            if let Some(id) = id {
                cur.remove_cached_object(id);
            }
            return;
        }
        let seg = &path.segments()[idx];
        if let Some(child) = cur.child(&seg.node_type, &seg.key) {
            Self::forget_from(&child, path, idx + 1, id);
            if cur.remove_child_if_empty(&seg.node_type, &seg.key) {
                trace!(node_type = %seg.node_type, key = %seg.key, "pruned");
            }
        }
    }

    /// Records the node under `it` at its full path, keyed by its id.
    pub fn record_node(
        &self,
        it: &LinkIterator,
    ) {
        self.record_object(&it.full_path(), it.node_id());
    }

    /// Records the node under `it` and, recursively, every node reachable
    /// through cached child links.
    pub fn record_subtree(
        &self,
        it: &LinkIterator,
    ) {
        self.record_node(it);
        it.for_each_cached_child_link(|child| self.record_subtree(&child), None);
    }

    /// Tears down the node under `it` and every node below it, children
    /// first: each node's delete callbacks run, then its cached mark is
    /// dropped and empty branches are pruned. Returns the number of
    /// callbacks invoked.
    pub fn forget_subtree(
        &self,
        it: &LinkIterator,
    ) -> usize {
        let mut invoked = 0;
        it.for_each_cached_child_link(|child| invoked += self.forget_subtree(&child), None);

        let event = NodeEvent {
            node: it.clone(),
            update_type: UpdateType::NodeDelete,
            old: Some(it.node_properties()),
            new: None,
        };
        invoked += self.dispatch_node_event(&event);
        self.forget_object(&it.full_path(), it.node_id());
        invoked
    }

    // -
    // Dispatch

    /// Runs the node callbacks matching the event's node. Updates that only
    /// touch bookkeeping properties are dropped. Returns the number of
    /// callbacks invoked.
    pub fn dispatch_node_event(
        &self,
        event: &NodeEvent,
    ) -> usize {
        if event.update_type == UpdateType::NodeUpdate {
            if let (Some(old), Some(new)) = (&event.old, &event.new) {
                if !properties_differ(old, new, NODE_BOOKKEEPING_PROPERTIES) {
                    trace!(dm = %self.name, node = event.node.node_id(), "node update without changes");
                    return 0;
                }
            }
        }

        let path = event.node.full_path();
        let callbacks = self.node_callbacks_for_path(&path);
        for cb in &callbacks {
            cb(event);
        }
        self.count_dispatch(event.update_type, callbacks.len());
        debug!(
            dm = %self.name,
            %path,
            update = %event.update_type,
            callbacks = callbacks.len(),
            "node event dispatched"
        );
        callbacks.len()
    }

    /// Runs the link callbacks matching the event's source node, one event
    /// per `<source id>/<dest type>/<dest key>` at a time.
    pub async fn dispatch_link_event(
        &self,
        event: &LinkEvent,
    ) -> usize {
        let ticket = self.scheduler.wait(event.scheduler_key()).await;

        if event.update_type == UpdateType::LinkUpdate {
            if let (Some(old), Some(new)) = (&event.old, &event.new) {
                if !properties_differ(old, new, LINK_BOOKKEEPING_PROPERTIES) {
                    trace!(dm = %self.name, key = ticket.key(), "link update without changes");
                    self.scheduler.done(ticket);
                    return 0;
                }
            }
        }

        let path = event.source.full_path();
        let callbacks = self.link_callbacks_for_path(&path, &event.dest_type);
        for cb in &callbacks {
            cb(event);
        }
        self.count_dispatch(event.update_type, callbacks.len());
        debug!(
            dm = %self.name,
            key = ticket.key(),
            update = %event.update_type,
            callbacks = callbacks.len(),
            "link event dispatched"
        );
        self.scheduler.done(ticket);
        callbacks.len()
    }

    // -
    // Introspection

    /// Copy of the tree and the recorded subscriptions as JSON.
    pub fn dump(&self) -> Result<Value> {
        // Release the shard locks before walking the roots.
        let roots: Vec<(String, Arc<SubscriptionNode>)> = self
            .roots
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let subtree = roots
            .into_iter()
            .map(|(node_type, root)| (node_type, root.dump()))
            .collect();
        let sub_list = self
            .sub_list
            .iter()
            .map(|s| (s.key().to_string(), *s.value()))
            .collect();
        Ok(serde_json::to_value(TreeDump { subtree, sub_list })?)
    }

    /// Logs the whole tree at debug level.
    pub fn print(&self) {
        let mut roots: Vec<(String, Arc<SubscriptionNode>)> = self
            .roots
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        roots.sort_by(|a, b| a.0.cmp(&b.0));

        let mut lines = Vec::new();
        for (node_type, root) in roots {
            root.describe(&node_type, 1, &mut lines);
        }
        debug!(dm = %self.name, "subscription tree:\n{}", lines.join("\n"));
    }

    fn root_or_create(
        &self,
        node_type: &str,
    ) -> Arc<SubscriptionNode> {
        self.roots
            .entry(node_type.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn update_subscription_metric(&self) {
        SUBSCRIPTIONS_METRIC
            .with_label_values(&[self.name.as_str()])
            .set(self.sub_list.len() as i64);
    }

    fn count_dispatch(
        &self,
        update_type: UpdateType,
        count: usize,
    ) {
        if count > 0 {
            DISPATCHED_CALLBACKS_METRIC
                .with_label_values(&[self.name.as_str(), update_type.as_str()])
                .inc_by(count as u64);
        }
    }
}

impl CacheSource for CacheTree {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn dump(&self) -> Result<Value> {
        CacheTree::dump(self)
    }
}
