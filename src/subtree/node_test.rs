use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use super::*;

fn counting_node_callback(counter: &Arc<AtomicUsize>) -> NodeCallback {
    let counter = counter.clone();
    Arc::new(move |_: &NodeEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn noop_link_callback() -> LinkCallback {
    Arc::new(|_: &LinkEvent| {})
}

#[test]
fn test_inc_weight_replays_only_on_first_subscriber() {
    let node = SubscriptionNode::new();
    assert!(node.inc_weight().is_empty());
    node.dec_weight();

    node.add_cached_object("o1", CachedNodeData::cached());
    node.add_cached_object("o2", CachedNodeData::cached());
    assert_eq!(node.inc_weight(), vec!["o1", "o2"]);
    assert!(node.inc_weight().is_empty());
    assert_eq!(node.weight(), 2);
}

#[test]
fn test_dec_weight_floors_at_zero() {
    let node = SubscriptionNode::new();
    node.dec_weight();
    assert_eq!(node.weight(), 0);
    node.init_weight();
    node.dec_weight();
    node.dec_weight();
    assert_eq!(node.weight(), 0);
}

#[test]
fn test_inc_child_weight_creates_then_delegates() {
    let root = SubscriptionNode::new();
    assert!(root.inc_child_weight("Tenant", "t1").is_empty());
    let child = root.child("Tenant", "t1").expect("child created");
    assert_eq!(child.weight(), 1);

    child.add_cached_object("o1", CachedNodeData::cached());
    assert!(root.inc_child_weight("Tenant", "t1").is_empty());
    assert_eq!(child.weight(), 2);

    child.dec_weight();
    child.dec_weight();
    assert_eq!(root.inc_child_weight("Tenant", "t1"), vec!["o1"]);
}

#[test]
fn test_del_child_removes_emptied_type() {
    let root = SubscriptionNode::new();
    root.add_child("Pod", "p1");
    root.add_child("Pod", "p2");
    assert_eq!(root.child_keys_for_type("Pod"), vec!["p1", "p2"]);

    assert!(root.del_child("Pod", "p1").is_some());
    assert!(root.is_type_known("Pod"));
    assert!(root.del_child("Pod", "p2").is_some());
    assert!(!root.is_type_known("Pod"));
    assert!(root.del_child("Pod", "p2").is_none());
    assert!(root.child_keys_for_type("Pod").is_empty());
}

#[test]
fn test_add_child_is_idempotent() {
    let root = SubscriptionNode::new();
    let a = root.add_child("Pod", "p1");
    let b = root.add_child("Pod", "p1");
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_remove_child_if_empty() {
    let root = SubscriptionNode::new();
    let child = root.add_child("Pod", "p1");
    child.add_cached_object("o1", CachedNodeData::cached());

    assert!(!root.remove_child_if_empty("Pod", "p1"));
    child.remove_cached_object("o1");
    assert!(root.remove_child_if_empty("Pod", "p1"));
    assert!(!root.is_type_known("Pod"));
    assert!(!root.remove_child_if_empty("Pod", "p1"));
}

#[test]
fn test_is_empty_tracks_every_piece_of_state() {
    let node = SubscriptionNode::new();
    assert!(node.is_empty());

    node.set_depth(2);
    assert!(!node.is_empty());
    node.set_depth(0);

    node.register_link_callback("Pod", noop_link_callback());
    assert!(!node.is_empty());

    let other = SubscriptionNode::new();
    other.add_child("Pod", "p1");
    assert!(!other.is_empty());

    let counter = Arc::new(AtomicUsize::new(0));
    let third = SubscriptionNode::new();
    third.register_node_callback(counting_node_callback(&counter));
    assert!(!third.is_empty());
}

#[test]
fn test_link_callbacks_are_grouped_by_destination_type() {
    let node = SubscriptionNode::new();
    node.register_link_callback("Pod", noop_link_callback());
    node.register_link_callback("Pod", noop_link_callback());
    node.register_link_callback("Svc", noop_link_callback());

    assert_eq!(node.link_callback_count(), 2);
    assert!(node.has_link_callbacks_for("Pod"));
    assert!(!node.has_link_callbacks_for("Node"));

    let mut seen = 0;
    node.for_each_link_callback("Pod", |_| seen += 1);
    assert_eq!(seen, 2);
    node.for_each_link_callback("Node", |_| seen += 1);
    assert_eq!(seen, 2);
}

#[test]
fn test_node_callbacks_keep_registration_order() {
    let node = SubscriptionNode::new();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for i in 0..3 {
        let order = order.clone();
        node.register_node_callback(Arc::new(move |_: &NodeEvent| order.lock().push(i)));
    }

    let event = NodeEvent {
        node: crate::link::MemNode::root("Root", "root", Default::default()).iterator(),
        update_type: UpdateType::NodeAdd,
        old: None,
        new: None,
    };
    node.for_each_node_callback(|cb| cb(&event));
    assert_eq!(*order.lock(), vec![0, 1, 2]);
    assert_eq!(node.node_callback_count(), 3);
}

#[test]
fn test_for_each_child_may_edit_the_node() {
    let root = SubscriptionNode::new();
    root.add_child("Pod", "p1");
    root.add_child("Svc", "s1");

    let mut visited = Vec::new();
    root.for_each_child(|t, k, _| {
        visited.push(format!("{}.{}", t, k));
        root.del_child(t, k);
    });
    assert_eq!(visited, vec!["Pod.p1", "Svc.s1"]);
    assert!(root.is_empty());
}

#[test]
fn test_for_each_cached_object() {
    let node = SubscriptionNode::new();
    node.add_cached_object("o1", CachedNodeData::cached());
    node.add_cached_object(
        "o2",
        CachedNodeData {
            requested: true,
            in_cache: false,
        },
    );

    let mut requested = Vec::new();
    node.for_each_cached_object(|id, data| {
        if data.requested {
            requested.push(id.to_string());
        }
    });
    assert_eq!(requested, vec!["o2"]);
}

#[test]
fn test_concurrent_inc_and_dec_weight() {
    let root = Arc::new(SubscriptionNode::new());
    root.add_child("Tenant", "t1");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let root = root.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                root.inc_child_weight("Tenant", "t1");
            }
            let child = root.child("Tenant", "t1").expect("child present");
            for _ in 0..400 {
                child.dec_weight();
            }
        }));
    }
    for h in handles {
        h.join().expect("thread should finish");
    }

    assert_eq!(root.child("Tenant", "t1").map(|c| c.weight()), Some(8 * 600));
}

#[test]
fn test_dump_copies_structure() {
    let root = SubscriptionNode::new();
    root.inc_child_weight("Tenant", "t1");
    root.child("Tenant", "t1")
        .expect("child")
        .add_cached_object("o1", CachedNodeData::cached());

    let dump = root.dump();
    let child = dump.child.get("Tenant.t1").expect("child in dump");
    assert_eq!(child.weight, 1);
    assert!(child.cached_nodes.contains_key("o1"));

    let json = serde_json::to_value(&dump).expect("serializable");
    assert_eq!(json["child"]["Tenant.t1"]["cached_nodes"]["o1"]["NodeInCache"], true);
    assert_eq!(json["cbfnNodeCount"], 0);
}
