use std::sync::Arc;

use dm_cache::CacheSource;
use dm_cache::CacheTree;
use dm_cache::DiagnosticsConfig;
use dm_cache::DiagnosticsRegistry;
use dm_cache::HandleRegistry;
use serde_json::json;
use serde_json::Value;

use crate::commons::path;

#[tokio::test]
async fn test_listing_and_dump_through_handles() {
    crate::enable_logger();
    let handles: HandleRegistry<Arc<dyn CacheSource>> = HandleRegistry::new("dm");
    let registry = Arc::new(DiagnosticsRegistry::new());

    let tree = Arc::new(CacheTree::new("tenants"));
    tree.subscribe(&path(&[("Root", "root"), ("Tenant", "t1")]), 1);
    let handle = registry.register_with_handle(&handles, tree.clone());

    let filter = dm_cache::routes(&DiagnosticsConfig::default(), registry.clone());

    let resp = warp::test::request()
        .path("/debug/nexus/dm")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 200);
    let list: Value = serde_json::from_slice(resp.body()).expect("json");
    assert_eq!(list, json!([{ "id": handle.to_string(), "name": "tenants" }]));

    let resp = warp::test::request()
        .path(&format!("/debug/nexus/dm?id={}", handle))
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 200);
    let mut dump: Value = serde_json::from_slice(resp.body()).expect("json");
    assert_eq!(dump["subList"]["/Root/root/Tenant/t1"], json!(1));

    // The dump is a copy.
    dump["subList"] = json!({});
    assert_eq!(tree.dump().expect("dump")["subList"]["/Root/root/Tenant/t1"], json!(1));

    let resp = warp::test::request()
        .path("/debug/nexus/dm?id=")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 400);
}
