use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dm_cache::CacheTree;
use dm_cache::KeyScheduler;
use dm_cache::LinkEvent;
use dm_cache::UpdateType;
use serde_json::json;

use crate::commons::path;
use crate::commons::props;
use crate::commons::tenant_graph;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_link_callbacks_on_same_link_never_overlap() {
    crate::enable_logger();
    let graph = tenant_graph();
    let tree = Arc::new(CacheTree::new("links"));

    let active = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (a, c) = (active.clone(), calls.clone());
    tree.subscribe_link(
        &path(&[("Root", "root"), ("Tenant", "t1")]),
        "Pod",
        Arc::new(move |_: &LinkEvent| {
            assert_eq!(a.fetch_add(1, Ordering::SeqCst), 0, "overlapping callbacks");
            std::thread::sleep(Duration::from_millis(2));
            a.fetch_sub(1, Ordering::SeqCst);
            c.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let mut handles = Vec::new();
    for i in 0..16 {
        let tree = tree.clone();
        let source = graph.tenant.iterator();
        handles.push(tokio::spawn(async move {
            let event = LinkEvent {
                source,
                update_type: UpdateType::LinkUpdate,
                dest_type: "Pod".to_string(),
                dest_key: "p1".to_string(),
                old: Some(props(&[("weight", json!(i))])),
                new: Some(props(&[("weight", json!(i + 1))])),
            };
            tree.dispatch_link_event(&event).await
        }));
    }
    for h in handles {
        assert_eq!(h.await.expect("task should not panic"), 1);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 16);
    assert!(tree.scheduler().queued_keys().is_empty());
}

#[tokio::test]
async fn test_scheduler_shared_between_caches() {
    let scheduler = KeyScheduler::new();
    let ticket = scheduler.wait("/Root/root/Tenant/t1/Pod/p1").await;

    let other = scheduler.clone();
    let blocked = tokio::time::timeout(
        Duration::from_millis(20),
        other.wait("/Root/root/Tenant/t1/Pod/p1"),
    )
    .await;
    assert!(blocked.is_err());

    scheduler.done(ticket);
    let again = tokio::time::timeout(
        Duration::from_millis(100),
        other.wait("/Root/root/Tenant/t1/Pod/p1"),
    )
    .await
    .expect("key released");
    other.done(again);
    assert!(scheduler.queued_keys().is_empty());
}
