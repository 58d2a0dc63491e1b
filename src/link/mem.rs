use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Weak;

use parking_lot::RwLock;

use super::BackingNode;
use super::Link;
use super::LinkIterator;
use super::PropertyMap;

type LinkKey = (String, String);

struct ChildEntry {
    node: Arc<MemNode>,
    properties: PropertyMap,
}

struct ReverseEntry {
    source: Weak<MemNode>,
    properties: PropertyMap,
}

/// In-memory backing node
///
/// Children are owned by their parent; parents and reverse-link sources are
/// held weakly so a dropped subtree is released.
pub struct MemNode {
    id: String,
    node_type: String,
    key: String,
    parent: Option<Weak<MemNode>>,
    properties: RwLock<PropertyMap>,
    children: RwLock<BTreeMap<LinkKey, ChildEntry>>,
    reverse: RwLock<BTreeMap<LinkKey, ReverseEntry>>,
}

impl MemNode {
    pub fn root(
        node_type: impl Into<String>,
        key: impl Into<String>,
        properties: PropertyMap,
    ) -> Arc<Self> {
        let node_type = node_type.into();
        let key = key.into();
        Arc::new(Self {
            id: format!("/{}/{}", node_type, key),
            node_type,
            key,
            parent: None,
            properties: RwLock::new(properties),
            children: RwLock::new(BTreeMap::new()),
            reverse: RwLock::new(BTreeMap::new()),
        })
    }

    /// Creates (or replaces) the child `(node_type, key)` joined by a link
    /// carrying `link_properties`.
    pub fn add_child(
        self: &Arc<Self>,
        node_type: impl Into<String>,
        key: impl Into<String>,
        properties: PropertyMap,
        link_properties: PropertyMap,
    ) -> Arc<MemNode> {
        let node_type = node_type.into();
        let key = key.into();
        let child = Arc::new(Self {
            id: format!("{}/{}/{}", self.id, node_type, key),
            node_type: node_type.clone(),
            key: key.clone(),
            parent: Some(Arc::downgrade(self)),
            properties: RwLock::new(properties),
            children: RwLock::new(BTreeMap::new()),
            reverse: RwLock::new(BTreeMap::new()),
        });
        self.children.write().insert(
            (node_type, key),
            ChildEntry {
                node: child.clone(),
                properties: link_properties,
            },
        );
        child
    }

    pub fn remove_child(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<Arc<MemNode>> {
        self.children
            .write()
            .remove(&(node_type.to_string(), key.to_string()))
            .map(|e| e.node)
    }

    /// Records that `source` links to this node.
    pub fn add_reverse_link(
        &self,
        source: &Arc<MemNode>,
        properties: PropertyMap,
    ) {
        self.reverse.write().insert(
            (source.node_type.clone(), source.key.clone()),
            ReverseEntry {
                source: Arc::downgrade(source),
                properties,
            },
        );
    }

    pub fn set_properties(
        &self,
        properties: PropertyMap,
    ) {
        *self.properties.write() = properties;
    }

    pub fn iterator(self: &Arc<Self>) -> LinkIterator {
        LinkIterator::new(self.clone())
    }

    fn child_iterator(
        (node_type, key): &LinkKey,
        entry: &ChildEntry,
    ) -> LinkIterator {
        LinkIterator::with_link(
            entry.node.clone(),
            Link {
                peer_type: node_type.clone(),
                peer_key: key.clone(),
                peer_id: entry.node.id.clone(),
                properties: entry.properties.clone(),
            },
        )
    }

    fn reverse_iterator(
        (node_type, key): &LinkKey,
        entry: &ReverseEntry,
    ) -> Option<LinkIterator> {
        let source = entry.source.upgrade()?;
        let peer_id = source.id.clone();
        Some(LinkIterator::with_link(
            source,
            Link {
                peer_type: node_type.clone(),
                peer_key: key.clone(),
                peer_id,
                properties: entry.properties.clone(),
            },
        ))
    }
}

impl BackingNode for MemNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn key_value(&self) -> &str {
        &self.key
    }

    fn parent(&self) -> Option<Arc<dyn BackingNode>> {
        let parent = self.parent.as_ref()?.upgrade()?;
        Some(parent as Arc<dyn BackingNode>)
    }

    fn properties(&self) -> PropertyMap {
        self.properties.read().clone()
    }

    fn for_each_cached_child_link(
        &self,
        node_type: Option<&str>,
        f: &mut dyn FnMut(LinkIterator),
    ) {
        // Snapshot first: the callback may walk back into this node.
        let links: Vec<LinkIterator> = self
            .children
            .read()
            .iter()
            .filter(|((t, _), _)| node_type.map_or(true, |want| want == t.as_str()))
            .map(|(k, e)| Self::child_iterator(k, e))
            .collect();
        links.into_iter().for_each(f);
    }

    fn for_each_cached_reverse_link(
        &self,
        node_type: Option<&str>,
        f: &mut dyn FnMut(LinkIterator),
    ) {
        let links: Vec<LinkIterator> = self
            .reverse
            .read()
            .iter()
            .filter(|((t, _), _)| node_type.map_or(true, |want| want == t.as_str()))
            .filter_map(|(k, e)| Self::reverse_iterator(k, e))
            .collect();
        links.into_iter().for_each(f);
    }

    fn cached_child_link(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<LinkIterator> {
        let k = (node_type.to_string(), key.to_string());
        self.children.read().get(&k).map(|e| Self::child_iterator(&k, e))
    }

    fn cached_reverse_link(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<LinkIterator> {
        let k = (node_type.to_string(), key.to_string());
        self.reverse.read().get(&k).and_then(|e| Self::reverse_iterator(&k, e))
    }
}
