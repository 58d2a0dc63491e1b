use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::link::MemNode;
use crate::link::PropertyMap;
use crate::subtree::LinkCallback;
use crate::subtree::LinkEvent;
use crate::subtree::NodeCallback;
use crate::subtree::NodeEvent;
use crate::subtree::UpdateType;
use crate::NodePath;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub(crate) fn props(pairs: &[(&str, Value)]) -> PropertyMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub(crate) fn path(pairs: &[(&str, &str)]) -> NodePath {
    NodePath::from_pairs(pairs.iter().copied())
}

/// Backing graph used across tree tests:
///
/// ```text
/// Root/root
/// └── Tenant/t1
///     ├── Pod/p1
///     └── Pod/p2
/// ```
pub(crate) struct SampleGraph {
    pub root: Arc<MemNode>,
    pub tenant: Arc<MemNode>,
    pub p1: Arc<MemNode>,
    pub p2: Arc<MemNode>,
}

pub(crate) fn sample_graph() -> SampleGraph {
    let root = MemNode::root("Root", "root", PropertyMap::new());
    let tenant = root.add_child("Tenant", "t1", PropertyMap::new(), PropertyMap::new());
    let p1 = tenant.add_child("Pod", "p1", PropertyMap::new(), PropertyMap::new());
    let p2 = tenant.add_child("Pod", "p2", PropertyMap::new(), PropertyMap::new());
    SampleGraph {
        root,
        tenant,
        p1,
        p2,
    }
}

/// Records `(node id, update type)` for every node event it receives.
#[derive(Clone, Default)]
pub(crate) struct NodeRecorder {
    pub events: Arc<Mutex<Vec<(String, UpdateType)>>>,
}

impl NodeRecorder {
    pub fn callback(&self) -> NodeCallback {
        let events = self.events.clone();
        Arc::new(move |e: &NodeEvent| {
            events.lock().push((e.node.node_id().to_string(), e.update_type));
        })
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

/// Records `(source id, dest key, update type)` for every link event.
#[derive(Clone, Default)]
pub(crate) struct LinkRecorder {
    pub events: Arc<Mutex<Vec<(String, String, UpdateType)>>>,
}

impl LinkRecorder {
    pub fn callback(&self) -> LinkCallback {
        let events = self.events.clone();
        Arc::new(move |e: &LinkEvent| {
            events.lock().push((
                e.source.node_id().to_string(),
                e.dest_key.clone(),
                e.update_type,
            ));
        })
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}
