use std::sync::Arc;

use dm_cache::CacheTree;
use dm_cache::NodeEvent;
use dm_cache::UpdateType;
use parking_lot::Mutex;
use serde_json::json;

use crate::commons::path;
use crate::commons::props;
use crate::commons::tenant_graph;

/// Weight transitions report cached objects only when a node becomes
/// interesting again.
#[test]
fn test_weight_replay_scenario() {
    crate::enable_logger();
    let tree = CacheTree::new("scenario");
    let p = path(&[("Root", "root"), ("Tenant", "t1")]);

    assert!(tree.inc_weight(&p).is_empty());
    assert!(tree.dec_weight(&p));
    tree.record_object(&p, "o1");
    assert_eq!(tree.inc_weight(&p), vec!["o1"]);
    assert!(tree.inc_weight(&p).is_empty());
    assert_eq!(tree.node(&p).map(|n| n.weight()), Some(2));
}

#[test]
fn test_wildcard_node_subscription_sees_every_pod() {
    let graph = tenant_graph();
    let tree = CacheTree::new("pods");
    tree.record_subtree(&graph.root.iterator());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let replay = tree.subscribe_node(
        &path(&[("Root", "root"), ("Tenant", "t1"), ("Pod", "*")]),
        Arc::new(move |event: &NodeEvent| {
            sink.lock().push((event.node.node_key().to_string(), event.update_type));
        }),
    );
    assert!(replay.contains(&"/Root/root/Tenant/t1/Pod/p1".to_string()));

    for pod in &graph.pods {
        let event = NodeEvent {
            node: pod.iterator(),
            update_type: UpdateType::NodeAdd,
            old: None,
            new: Some(props(&[("phase", json!("Running"))])),
        };
        assert_eq!(tree.dispatch_node_event(&event), 1);
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(_, t)| *t == UpdateType::NodeAdd));
}

#[test]
fn test_bookkeeping_only_update_is_not_dispatched() {
    let graph = tenant_graph();
    let tree = CacheTree::new("noise");
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    tree.subscribe_node(
        &path(&[("Root", "root"), ("Tenant", "t1")]),
        Arc::new(move |_: &NodeEvent| *sink.lock() += 1),
    );

    let event = NodeEvent {
        node: graph.tenant.iterator(),
        update_type: UpdateType::NodeUpdate,
        old: Some(props(&[("owner", json!("alice")), ("revision", json!(1))])),
        new: Some(props(&[("owner", json!("alice")), ("revision", json!(2))])),
    };
    assert_eq!(tree.dispatch_node_event(&event), 0);
    assert_eq!(*count.lock(), 0);
}

#[test]
fn test_unsubscribe_restores_an_empty_tree() {
    let tree = CacheTree::new("teardown");
    let p = path(&[("Root", "root"), ("Tenant", "t1"), ("Pod", "p1")]);

    tree.subscribe(&p, 2);
    assert!(tree.check_path(&p));
    assert!(tree.unsubscribe(&p).expect("recorded subscription"));
    assert!(!tree.check_path(&p));

    let dump = tree.dump().expect("dump");
    assert!(dump["subList"].as_object().expect("map").is_empty());
    assert_eq!(dump["subtree"]["Root"]["weight"], json!(0));
    assert!(dump["subtree"]["Root"]["child"].as_object().expect("map").is_empty());
}

#[test]
fn test_concurrent_subscribers_balance_out() {
    let tree = Arc::new(CacheTree::new("concurrent"));
    let p = path(&[("Root", "root"), ("Tenant", "t1"), ("Pod", "p1")]);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tree = tree.clone();
            let p = p.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    tree.inc_weight(&p);
                    tree.dec_weight(&p);
                }
                tree.inc_weight(&p);
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread should finish");
    }

    assert_eq!(tree.node(&p).map(|n| n.weight()), Some(8));
}
