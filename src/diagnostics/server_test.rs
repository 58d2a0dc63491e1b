use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value;
use tokio::sync::watch;

use super::*;
use crate::test_utils;
use crate::CacheTree;
use crate::DiagnosticsConfig;
use crate::Error;

fn registry_with_tree() -> (Arc<DiagnosticsRegistry>, Arc<CacheTree>) {
    let registry = Arc::new(DiagnosticsRegistry::new());
    let tree = Arc::new(CacheTree::new("tenants"));
    tree.subscribe(&test_utils::path(&[("Root", "root"), ("Tenant", "t1")]), 2);
    registry.register("dm-1", tree.clone());
    (registry, tree)
}

fn body_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn test_list_without_query() {
    test_utils::enable_logger();
    let (registry, _tree) = registry_with_tree();
    let filter = routes(&DiagnosticsConfig::default(), registry);

    let resp = warp::test::request()
        .method("GET")
        .path("/debug/nexus/dm")
        .reply(&filter)
        .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(
        body_json(resp.body()),
        json!([{ "id": "dm-1", "name": "tenants" }])
    );
}

#[tokio::test]
async fn test_dump_by_id() {
    let (registry, _tree) = registry_with_tree();
    let filter = routes(&DiagnosticsConfig::default(), registry);

    let resp = warp::test::request()
        .path("/debug/nexus/dm?id=dm-1")
        .reply(&filter)
        .await;

    assert_eq!(resp.status(), 200);
    let dump = body_json(resp.body());
    assert_eq!(dump["subList"]["/Root/root/Tenant/t1"], json!(2));
    assert_eq!(dump["subtree"]["Root"]["child"]["Tenant.t1"]["depth"], json!(2));
}

#[tokio::test]
async fn test_missing_id_is_bad_request() {
    let (registry, _tree) = registry_with_tree();
    let filter = routes(&DiagnosticsConfig::default(), registry);

    for path in ["/debug/nexus/dm?other=1", "/debug/nexus/dm?id="] {
        let resp = warp::test::request().path(path).reply(&filter).await;
        assert_eq!(resp.status(), 400, "path {}", path);
        let body = body_json(resp.body());
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }
}

#[tokio::test]
async fn test_unknown_id_is_bad_request() {
    let (registry, _tree) = registry_with_tree();
    let filter = routes(&DiagnosticsConfig::default(), registry);

    let resp = warp::test::request()
        .path("/debug/nexus/dm?id=nope")
        .reply(&filter)
        .await;

    assert_eq!(resp.status(), 400);
    let body = body_json(resp.body());
    assert!(body["error"].as_str().unwrap().contains("(nope) does not exist"));
}

#[tokio::test]
async fn test_failing_dump_is_server_error() {
    let mut source = MockCacheSource::new();
    source
        .expect_dump()
        .returning(|| Err(Error::Fatal("encoding".to_string())));
    let registry = Arc::new(DiagnosticsRegistry::new());
    registry.register("broken", Arc::new(source));
    let filter = routes(&DiagnosticsConfig::default(), registry);

    let resp = warp::test::request()
        .path("/debug/nexus/dm?id=broken")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 500);
}

#[tokio::test]
async fn test_custom_prefix_and_unknown_route() {
    let (registry, _tree) = registry_with_tree();
    let config = DiagnosticsConfig {
        path_prefix: "cache/trees".to_string(),
        ..DiagnosticsConfig::default()
    };
    let filter = routes(&config, registry);

    let resp = warp::test::request()
        .path("/debug/cache/trees")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 200);

    let resp = warp::test::request()
        .path("/debug/nexus/dm")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_write_methods_are_rejected() {
    let (registry, _tree) = registry_with_tree();
    let filter = routes(&DiagnosticsConfig::default(), registry);

    let resp = warp::test::request()
        .method("POST")
        .path("/debug/nexus/dm?id=dm-1")
        .reply(&filter)
        .await;
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn test_metrics_route_is_served() {
    let (registry, _tree) = registry_with_tree();
    let filter = routes(&DiagnosticsConfig::default(), registry);

    let resp = warp::test::request().path("/metrics").reply(&filter).await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_bind_ephemeral_port_and_shutdown() {
    let (registry, _tree) = registry_with_tree();
    let config = DiagnosticsConfig {
        enabled: true,
        listen_address: "127.0.0.1".to_string(),
        port: 0,
        ..DiagnosticsConfig::default()
    };
    let (tx, rx) = watch::channel(());

    let (addr, server) = bind(&config, registry, rx).expect("bind");
    assert_ne!(addr.port(), 0);
    let handle = tokio::spawn(server);

    tx.send(()).expect("server is listening for shutdown");
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server stops on shutdown")
        .expect("server task should not panic");
}

#[tokio::test]
async fn test_bind_rejects_bad_listen_address() {
    let config = DiagnosticsConfig {
        listen_address: "not-an-ip".to_string(),
        ..DiagnosticsConfig::default()
    };
    let (_tx, rx) = watch::channel(());
    let result = bind(&config, Arc::new(DiagnosticsRegistry::new()), rx);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_disabled_server_returns_immediately() {
    let (_tx, rx) = watch::channel(());
    let result = tokio::time::timeout(
        Duration::from_millis(100),
        start_server(&DiagnosticsConfig::default(), Arc::new(DiagnosticsRegistry::new()), rx),
    )
    .await
    .expect("disabled server must not block");
    assert!(result.is_ok());
}
