use std::fmt;
use std::sync::Arc;

use super::BackingNode;
use super::Link;
use super::PropertyMap;
use crate::NodePath;

/// Cursor over one backing node, optionally paired with the link that was
/// traversed to reach it.
#[derive(Clone)]
pub struct LinkIterator {
    node: Arc<dyn BackingNode>,
    link: Option<Link>,
}

impl fmt::Debug for LinkIterator {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LinkIterator")
            .field("node_id", &self.node.id())
            .field("link", &self.link)
            .finish()
    }
}

impl LinkIterator {
    pub fn new(node: Arc<dyn BackingNode>) -> Self {
        Self { node, link: None }
    }

    pub fn with_link(
        node: Arc<dyn BackingNode>,
        link: Link,
    ) -> Self {
        Self {
            node,
            link: Some(link),
        }
    }

    pub fn node(&self) -> &Arc<dyn BackingNode> {
        &self.node
    }

    pub fn node_id(&self) -> &str {
        self.node.id()
    }

    pub fn node_type(&self) -> &str {
        self.node.node_type()
    }

    pub fn node_key(&self) -> &str {
        self.node.key_value()
    }

    /// Iterator over the parent node. The parent iterator carries no link.
    pub fn parent_iterator(&self) -> Option<LinkIterator> {
        self.node.parent().map(LinkIterator::new)
    }

    /// Empty at the root.
    pub fn parent_key(&self) -> String {
        self.node
            .parent()
            .map(|p| p.key_value().to_string())
            .unwrap_or_default()
    }

    /// Empty at the root.
    pub fn parent_type(&self) -> String {
        self.node
            .parent()
            .map(|p| p.node_type().to_string())
            .unwrap_or_default()
    }

    pub fn for_each_cached_child_link(
        &self,
        mut f: impl FnMut(LinkIterator),
        node_type: Option<&str>,
    ) {
        self.node.for_each_cached_child_link(node_type, &mut f);
    }

    pub fn for_each_cached_reverse_link(
        &self,
        mut f: impl FnMut(LinkIterator),
        node_type: Option<&str>,
    ) {
        self.node.for_each_cached_reverse_link(node_type, &mut f);
    }

    pub fn cached_child_link(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<LinkIterator> {
        self.node.cached_child_link(node_type, key)
    }

    pub fn cached_reverse_link(
        &self,
        node_type: &str,
        key: &str,
    ) -> Option<LinkIterator> {
        self.node.cached_reverse_link(node_type, key)
    }

    pub fn node_properties(&self) -> PropertyMap {
        self.node.properties()
    }

    /// Properties of the link this iterator was built from. The flag is
    /// `false` when there is no link context.
    pub fn link_properties(&self) -> (PropertyMap, bool) {
        match &self.link {
            Some(link) => (link.properties.clone(), true),
            None => (PropertyMap::new(), false),
        }
    }

    pub fn link(&self) -> Option<&Link> {
        self.link.as_ref()
    }

    /// Root-to-node path built from the parent chain.
    pub fn full_path(&self) -> NodePath {
        let mut segments = vec![(
            self.node.node_type().to_string(),
            self.node.key_value().to_string(),
        )];
        let mut cur = self.node.parent();
        while let Some(node) = cur {
            segments.push((node.node_type().to_string(), node.key_value().to_string()));
            cur = node.parent();
        }
        segments.reverse();
        NodePath::from_pairs(segments)
    }
}
