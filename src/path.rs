//! Cache paths: ordered `(type, key)` segments from a root to a node.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::WILDCARD_KEY;

/// One `(object-type, object-key)` step of a [`NodePath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathSegment {
    pub node_type: String,
    pub key: String,
}

impl PathSegment {
    pub fn new(
        node_type: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            key: key.into(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.key == WILDCARD_KEY
    }
}

/// Position in the subscription tree, root first
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from `(type, key)` pairs.
    ///
    /// ```
    /// use dm_cache::NodePath;
    ///
    /// let path = NodePath::from_pairs([("Root", "root"), ("Tenant", "t1")]);
    /// assert_eq!(path.to_string(), "/Root/root/Tenant/t1");
    /// ```
    pub fn from_pairs<T, K>(pairs: impl IntoIterator<Item = (T, K)>) -> Self
    where
        T: Into<String>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(t, k)| PathSegment::new(t, k)).collect())
    }

    /// Parses the `/type/key/type/key` form produced by `Display`.
    ///
    /// Returns `None` for an odd number of segments or empty components.
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('/').skip(1).collect();
        if parts.is_empty() || parts.len() % 2 != 0 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self::from_pairs(parts.chunks(2).map(|c| (c[0], c[1]))))
    }

    pub fn push(
        &mut self,
        node_type: impl Into<String>,
        key: impl Into<String>,
    ) {
        self.0.push(PathSegment::new(node_type, key));
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Path of the parent node, `None` at the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }
}

impl fmt::Display for NodePath {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for seg in &self.0 {
            write!(f, "/{}/{}", seg.node_type, seg.key)?;
        }
        Ok(())
    }
}

impl From<Vec<PathSegment>> for NodePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}
