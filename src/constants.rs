// -
// Handle registry

/// Fixed number of handle registry shards; shard = handle % HANDLE_SHARDS
pub const HANDLE_SHARDS: usize = 64;

/// First handle issued by a fresh registry. Zero is never a valid handle.
pub(crate) const FIRST_HANDLE: u64 = 1;

// -
// Subscription paths

/// Path key matching every key of the segment's type
pub const WILDCARD_KEY: &str = "*";

/// Node properties ignored when deciding whether a node update is a real change
pub const NODE_BOOKKEEPING_PROPERTIES: &[&str] =
    &["creationTime", "createdBy", "revision", "toBeDeleted"];

/// Link properties ignored when deciding whether a link update is a real change
pub const LINK_BOOKKEEPING_PROPERTIES: &[&str] = &["createdBy", "creationTime", "revision"];

/// Set on a node that is being torn down; its arrival alone does not bump
/// `changeId` / `updateTime` into a visible update.
pub(crate) const PROP_TO_BE_DELETED: &str = "toBeDeleted";
pub(crate) const PROP_CHANGE_ID: &str = "changeId";
pub(crate) const PROP_UPDATE_TIME: &str = "updateTime";

// -
// Diagnostics

pub(crate) const DEFAULT_DIAGNOSTICS_PORT: u16 = 6000;
pub(crate) const DEFAULT_PROMETHEUS_PORT: u16 = 8080;
pub(crate) const DEFAULT_DIAGNOSTICS_PREFIX: &str = "nexus/dm";
pub(crate) const DIAGNOSTICS_ID_PARAM: &str = "id";
