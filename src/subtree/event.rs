use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::constants::PROP_CHANGE_ID;
use crate::constants::PROP_TO_BE_DELETED;
use crate::constants::PROP_UPDATE_TIME;
use crate::link::LinkIterator;
use crate::link::PropertyMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateType {
    NodeAdd,
    NodeUpdate,
    NodeDelete,
    LinkAdd,
    LinkUpdate,
    LinkDelete,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::NodeAdd => "node_add",
            UpdateType::NodeUpdate => "node_update",
            UpdateType::NodeDelete => "node_delete",
            UpdateType::LinkAdd => "link_add",
            UpdateType::LinkUpdate => "link_update",
            UpdateType::LinkDelete => "link_delete",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node was added, updated or deleted in the backing store.
#[derive(Debug, Clone)]
pub struct NodeEvent {
    pub node: LinkIterator,
    pub update_type: UpdateType,
    /// Properties before the change; `None` for `NodeAdd`
    pub old: Option<PropertyMap>,
    /// Properties after the change; `None` for `NodeDelete`
    pub new: Option<PropertyMap>,
}

/// A link out of `source` was added, updated or deleted.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    pub source: LinkIterator,
    pub update_type: UpdateType,
    pub dest_type: String,
    pub dest_key: String,
    pub old: Option<PropertyMap>,
    pub new: Option<PropertyMap>,
}

impl LinkEvent {
    /// Serialization key for events touching the same link.
    pub fn scheduler_key(&self) -> String {
        format!("{}/{}/{}", self.source.node_id(), self.dest_type, self.dest_key)
    }
}

pub type NodeCallback = Arc<dyn Fn(&NodeEvent) + Send + Sync>;

pub type LinkCallback = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Whether `new` differs from `old` on any property outside `exclude`.
///
/// A `toBeDeleted` marker appearing for the first time does not make
/// `changeId` or `updateTime` churn count as a change. Numbers compare by
/// value, so `1` and `1.0` are equal.
pub fn properties_differ(
    old: &PropertyMap,
    new: &PropertyMap,
    exclude: &[&str],
) -> bool {
    if exclude.is_empty() && old.len() != new.len() {
        return true;
    }

    let marking_deleted =
        new.contains_key(PROP_TO_BE_DELETED) && !old.contains_key(PROP_TO_BE_DELETED);
    let skipped = |key: &str| {
        exclude.contains(&key)
            || (marking_deleted && (key == PROP_CHANGE_ID || key == PROP_UPDATE_TIME))
    };

    for (key, old_value) in old {
        if skipped(key) {
            continue;
        }
        // A dropped key is a change even with an exclude list, where the
        // length check above does not run.
        match new.get(key) {
            Some(new_value) if values_equal(old_value, new_value) => {}
            _ => {
                trace!(%key, "property changed or removed");
                return true;
            }
        }
    }

    for key in new.keys() {
        if !exclude.contains(&key.as_str()) && !old.contains_key(key) {
            trace!(%key, "property added");
            return true;
        }
    }

    false
}

fn values_equal(
    a: &Value,
    b: &Value,
) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => {
            x.as_f64() == y.as_f64()
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            // At least one side is above i64::MAX.
            _ => x.as_u64().is_some() && x.as_u64() == y.as_u64(),
        },
        _ => a == b,
    }
}
