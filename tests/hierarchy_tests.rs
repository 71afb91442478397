//! Hierarchy mutation rules and structural queries

use proptest::prelude::*;
use scoped_rbac::hierarchy::ChildIndex;
use scoped_rbac::{ChildEdge, InMemoryPolicyStore, Item, RbacError, RbacManager};
use std::sync::Arc;

async fn manager() -> RbacManager {
    let store = Arc::new(InMemoryPolicyStore::default());
    let manager = RbacManager::builder(store, "acme").build().unwrap();

    manager.add_item(Item::role("admin")).await.unwrap();
    manager.add_item(Item::role("editor")).await.unwrap();
    manager.add_item(Item::role("viewer")).await.unwrap();
    manager.add_item(Item::permission("read")).await.unwrap();
    manager.add_item(Item::permission("write")).await.unwrap();

    manager.add_child("admin", "editor").await.unwrap();
    manager.add_child("editor", "viewer").await.unwrap();
    manager.add_child("viewer", "read").await.unwrap();
    manager.add_child("editor", "write").await.unwrap();

    manager
}

#[tokio::test]
async fn self_loop_is_a_validation_fault() {
    let m = manager().await;
    let err = m.add_child("admin", "admin").await.unwrap_err();
    assert!(matches!(err, RbacError::Validation(_)), "got {err:?}");
}

#[tokio::test]
async fn permission_cannot_parent_a_role() {
    let m = manager().await;
    let err = m.add_child("read", "viewer").await.unwrap_err();
    assert!(matches!(err, RbacError::Validation(_)), "got {err:?}");
    // The other direction is of course fine, and permissions may nest
    m.add_item(Item::permission("read-draft")).await.unwrap();
    m.add_child("read", "read-draft").await.unwrap();
}

#[tokio::test]
async fn missing_endpoint_is_not_found() {
    let m = manager().await;
    let err = m.add_child("admin", "ghost").await.unwrap_err();
    assert!(matches!(err, RbacError::NotFound(_)), "got {err:?}");
    let err = m.add_child("ghost", "admin").await.unwrap_err();
    assert!(matches!(err, RbacError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn back_edge_is_rejected_as_a_cycle() {
    let m = manager().await;

    assert!(!m.can_add_child("viewer", "admin").await.unwrap());
    let err = m.add_child("viewer", "admin").await.unwrap_err();
    match err {
        RbacError::Cycle { parent, child } => {
            assert_eq!(parent, "viewer");
            assert_eq!(child, "admin");
        }
        other => panic!("expected cycle error, got {other:?}"),
    }

    // A shortcut over an existing path is not a cycle
    assert!(m.can_add_child("admin", "viewer").await.unwrap());
    m.add_child("admin", "viewer").await.unwrap();
}

#[tokio::test]
async fn re_adding_an_edge_is_a_no_op() {
    let m = manager().await;
    m.add_child("admin", "editor").await.unwrap();
    let children = m.get_children("admin").await.unwrap();
    assert_eq!(children.len(), 1);
}

#[tokio::test]
async fn removing_edges() {
    let m = manager().await;

    assert!(m.has_child("editor", "write").await.unwrap());
    assert!(m.remove_child("editor", "write").await.unwrap());
    assert!(!m.has_child("editor", "write").await.unwrap());
    assert!(!m.remove_child("editor", "write").await.unwrap());

    assert!(m.remove_children("editor").await.unwrap());
    assert!(m.get_children("editor").await.unwrap().is_empty());
    assert!(!m.remove_children("editor").await.unwrap());

    // The items themselves are untouched
    assert!(m.get_item("viewer").await.unwrap().is_some());
}

#[tokio::test]
async fn child_queries() {
    let m = manager().await;

    let mut children: Vec<String> = m
        .get_children("editor")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    children.sort();
    assert_eq!(children, vec!["viewer", "write"]);

    let mut child_roles: Vec<String> = m
        .get_child_roles("admin")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    child_roles.sort();
    assert_eq!(child_roles, vec!["admin", "editor", "viewer"]);

    let mut perms: Vec<String> = m
        .get_permissions_by_role("admin")
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    perms.sort();
    assert_eq!(perms, vec!["read", "write"]);

    // Unknown name yields an empty closure rather than an error
    assert!(m.get_permissions_by_role("ghost").await.unwrap().is_empty());
}

#[tokio::test]
async fn removing_an_item_detaches_its_edges() {
    let m = manager().await;

    m.remove_item("editor").await.unwrap();
    assert!(m.get_children("admin").await.unwrap().is_empty());
    assert!(m.get_item("editor").await.unwrap().is_none());
    // viewer's own subtree is intact
    let children = m.get_children("viewer").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "read");
}

#[tokio::test]
async fn updating_an_item_preserves_identity() {
    let m = manager().await;

    let before = m.get_item("viewer").await.unwrap().unwrap();
    let renamed = Item {
        name: "reader".to_string(),
        description: Some("read-only access".to_string()),
        ..before.clone()
    };
    m.update_item("viewer", renamed).await.unwrap();

    let after = m.get_item("reader").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.created_at, before.created_at);
    assert!(m.get_item("viewer").await.unwrap().is_none());

    // Edges reference ids, so the hierarchy survives the rename
    let children = m.get_children("reader").await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "read");

    let err = m.update_item("ghost", before).await.unwrap_err();
    assert!(matches!(err, RbacError::NotFound(_)), "got {err:?}");
}

fn fixture_items(n: usize) -> Vec<Item> {
    (0..n).map(|i| Item::role(format!("r{i}"))).collect()
}

proptest! {
    // Any edge sequence filtered through would_cycle leaves the graph acyclic
    #[test]
    fn guarded_insertion_never_creates_a_cycle(
        pairs in prop::collection::vec((0usize..8, 0usize..8), 0..40)
    ) {
        let items = fixture_items(8);
        let mut edges: Vec<ChildEdge> = Vec::new();

        for (p, c) in pairs {
            let index = ChildIndex::build(&items, &edges);
            if !index.would_cycle(&items[p].name, &items[c].name) {
                edges.push(ChildEdge::new(items[p].id, items[c].id));
            }
        }

        let index = ChildIndex::build(&items, &edges);
        for item in &items {
            prop_assert!(
                !index.descendants(&item.name).contains(&item.name),
                "{} reaches itself", item.name
            );
        }
    }

    // would_cycle is exactly "child already reaches parent, or self-loop"
    #[test]
    fn would_cycle_matches_reachability(
        pairs in prop::collection::vec((0usize..6, 0usize..6), 0..20),
        candidate in (0usize..6, 0usize..6)
    ) {
        let items = fixture_items(6);
        let mut edges: Vec<ChildEdge> = Vec::new();
        for (p, c) in pairs {
            let index = ChildIndex::build(&items, &edges);
            if !index.would_cycle(&items[p].name, &items[c].name) {
                edges.push(ChildEdge::new(items[p].id, items[c].id));
            }
        }

        let index = ChildIndex::build(&items, &edges);
        let (p, c) = candidate;
        let parent = &items[p].name;
        let child = &items[c].name;
        let expected = p == c || index.descendants(child).contains(parent);
        prop_assert_eq!(index.would_cycle(parent, child), expected);
    }
}
