//! Scope partitioning: visibility, name uniqueness and bulk removal

use scoped_rbac::{
    InMemoryPolicyStore, Item, ItemKind, RbacError, RbacManager, ScopeSource,
};
use std::collections::HashMap;
use std::sync::Arc;

fn two_tenants() -> (Arc<InMemoryPolicyStore>, RbacManager, RbacManager) {
    let store = Arc::new(InMemoryPolicyStore::default());
    let alpha = RbacManager::builder(store.clone(), "alpha").build().unwrap();
    let beta = RbacManager::builder(store.clone(), "beta").build().unwrap();
    (store, alpha, beta)
}

#[tokio::test]
async fn scoped_items_are_invisible_to_other_scopes() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::role("local-admin").scoped()).await.unwrap();
    alpha.add_item(Item::role("everyone")).await.unwrap();

    assert!(alpha.get_item("local-admin").await.unwrap().is_some());
    assert!(beta.get_item("local-admin").await.unwrap().is_none());
    // Shared items show up in both partitions
    assert!(alpha.get_item("everyone").await.unwrap().is_some());
    assert!(beta.get_item("everyone").await.unwrap().is_some());
}

#[tokio::test]
async fn same_scoped_name_in_two_scopes() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::permission("publish").scoped()).await.unwrap();
    beta.add_item(Item::permission("publish").scoped()).await.unwrap();

    let a = alpha.get_item("publish").await.unwrap().unwrap();
    let b = beta.get_item("publish").await.unwrap().unwrap();
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn uniqueness_rules() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::role("editor")).await.unwrap();

    // A scoped item cannot take a name that is visible via the shared set
    let err = alpha.add_item(Item::role("editor").scoped()).await.unwrap_err();
    assert!(matches!(err, RbacError::Validation(_)), "got {err:?}");

    // Nor can a second shared item
    let err = beta.add_item(Item::role("editor")).await.unwrap_err();
    assert!(matches!(err, RbacError::Validation(_)), "got {err:?}");

    // But a shared item may take a name already used by a scoped one
    beta.add_item(Item::role("reviewer").scoped()).await.unwrap();
    alpha.add_item(Item::role("reviewer")).await.unwrap();
}

#[tokio::test]
async fn shared_name_shadows_the_scoped_one() {
    let (_store, alpha, _beta) = two_tenants();

    alpha.add_item(Item::role("ops").scoped()).await.unwrap();
    let scoped = alpha.get_item("ops").await.unwrap().unwrap();

    alpha.add_item(Item::role("ops")).await.unwrap();
    let resolved = alpha.get_item("ops").await.unwrap().unwrap();
    assert_ne!(resolved.id, scoped.id);
    assert!(!resolved.is_scoped);
}

#[tokio::test]
async fn shadowed_item_hierarchy_does_not_leak_into_checks() {
    let (_store, alpha, _beta) = two_tenants();
    let params = HashMap::new();

    alpha.add_item(Item::role("staff").scoped()).await.unwrap();
    alpha.add_item(Item::permission("ops").scoped()).await.unwrap();
    alpha.add_child("staff", "ops").await.unwrap();
    alpha.assign("staff", "uma").await.unwrap();
    assert!(alpha.check_access("uma", "ops", &params).await.unwrap());

    // A later shared permission takes the name; the scoped one is shadowed
    alpha.add_item(Item::permission("ops")).await.unwrap();
    let resolved = alpha.get_item("ops").await.unwrap().unwrap();
    assert!(!resolved.is_scoped);

    // The shared item has no parents of its own, so uma's grant on the
    // shadowed item's parent must not carry over
    assert!(!alpha.check_access("uma", "ops", &params).await.unwrap());
}

#[tokio::test]
async fn checks_are_partitioned() {
    let (_store, alpha, beta) = two_tenants();
    let params = HashMap::new();

    alpha.add_item(Item::role("staff").scoped()).await.unwrap();
    alpha.add_item(Item::permission("deploy").scoped()).await.unwrap();
    alpha.add_child("staff", "deploy").await.unwrap();
    alpha.assign("staff", "uma").await.unwrap();

    assert!(alpha.check_access("uma", "deploy", &params).await.unwrap());
    assert!(!beta.check_access("uma", "deploy", &params).await.unwrap());
}

#[tokio::test]
async fn edges_require_visible_endpoints() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::role("staff").scoped()).await.unwrap();
    beta.add_item(Item::permission("deploy").scoped()).await.unwrap();

    // beta cannot see alpha's role, so the edge cannot be expressed there
    let err = beta.add_child("staff", "deploy").await.unwrap_err();
    assert!(matches!(err, RbacError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn bulk_removal_is_scope_local() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::role("local-a").scoped()).await.unwrap();
    alpha.add_item(Item::permission("perm-a").scoped()).await.unwrap();
    alpha.add_child("local-a", "perm-a").await.unwrap();
    alpha.assign("local-a", "uma").await.unwrap();
    beta.add_item(Item::role("local-b").scoped()).await.unwrap();
    alpha.add_item(Item::role("shared-role")).await.unwrap();

    alpha.remove_all().await.unwrap();

    assert!(alpha.get_item("local-a").await.unwrap().is_none());
    assert!(alpha.get_item("perm-a").await.unwrap().is_none());
    assert!(alpha.get_assignments("uma").await.unwrap().is_empty());
    // The other scope and the shared set survive
    assert!(beta.get_item("local-b").await.unwrap().is_some());
    assert!(alpha.get_item("shared-role").await.unwrap().is_some());
}

#[tokio::test]
async fn kind_scoped_bulk_removal() {
    let (_store, alpha, _beta) = two_tenants();

    alpha.add_item(Item::role("local-role").scoped()).await.unwrap();
    alpha.add_item(Item::permission("local-perm").scoped()).await.unwrap();
    alpha.add_item(Item::role("shared-role")).await.unwrap();

    alpha.remove_all_roles().await.unwrap();
    assert!(alpha.get_item("local-role").await.unwrap().is_none());
    assert!(alpha.get_item("local-perm").await.unwrap().is_some());
    assert!(alpha.get_item("shared-role").await.unwrap().is_some());

    alpha.remove_all_permissions().await.unwrap();
    assert!(alpha.get_item("local-perm").await.unwrap().is_none());
}

#[tokio::test]
async fn rule_detachment_is_scope_local() {
    use scoped_rbac::{Rule, RulePayload};
    let (_store, alpha, _beta) = two_tenants();

    alpha
        .add_rule(Rule::new("gate", RulePayload::cel("true")))
        .await
        .unwrap();
    alpha
        .add_item(Item::permission("local").scoped().with_rule("gate"))
        .await
        .unwrap();
    alpha
        .add_item(Item::permission("shared").with_rule("gate"))
        .await
        .unwrap();

    alpha.remove_all_rules().await.unwrap();

    assert_eq!(alpha.get_item("local").await.unwrap().unwrap().rule_name, None);
    // Shared items keep their rule, and the rule record itself survives
    assert_eq!(
        alpha.get_item("shared").await.unwrap().unwrap().rule_name.as_deref(),
        Some("gate")
    );
    assert!(alpha.get_rule("gate").await.unwrap().is_some());
}

#[tokio::test]
async fn assignment_bulk_removal_is_scope_local() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::role("local-a").scoped()).await.unwrap();
    alpha.add_item(Item::role("shared")).await.unwrap();
    beta.add_item(Item::role("local-b").scoped()).await.unwrap();

    alpha.assign("local-a", "uma").await.unwrap();
    alpha.assign("shared", "uma").await.unwrap();
    beta.assign("local-b", "uma").await.unwrap();

    alpha.remove_all_assignments().await.unwrap();

    let left = alpha.get_assignments("uma").await.unwrap();
    assert!(left.contains_key("shared"));
    assert!(!left.contains_key("local-a"));
    assert!(beta.get_assignments("uma").await.unwrap().contains_key("local-b"));
}

#[tokio::test]
async fn scope_can_come_from_a_resolver() {
    let store = Arc::new(InMemoryPolicyStore::default());
    let source = ScopeSource::Resolver(Arc::new(|| "resolved-scope".to_string()));
    let manager = RbacManager::builder(store, source).build().unwrap();
    assert_eq!(manager.scope_id(), "resolved-scope");
}

#[tokio::test]
async fn manager_debug_names_the_scope() {
    let store = Arc::new(InMemoryPolicyStore::default());
    let manager = RbacManager::builder(store, "alpha").build().unwrap();
    let rendered = format!("{manager:?}");
    assert!(rendered.contains("RbacManager"));
    assert!(rendered.contains("alpha"));
}

#[tokio::test]
async fn empty_scope_is_a_configuration_fault() {
    let store = Arc::new(InMemoryPolicyStore::default());
    let err = RbacManager::builder(store, "").build().unwrap_err();
    assert!(matches!(err, RbacError::Configuration(_)), "got {err:?}");
}

#[tokio::test]
async fn listing_respects_the_partition() {
    let (_store, alpha, beta) = two_tenants();

    alpha.add_item(Item::role("a-role").scoped()).await.unwrap();
    alpha.add_item(Item::permission("a-perm").scoped()).await.unwrap();
    alpha.add_item(Item::role("common")).await.unwrap();

    let mut alpha_roles: Vec<String> = alpha
        .get_items(Some(ItemKind::Role))
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    alpha_roles.sort();
    assert_eq!(alpha_roles, vec!["a-role", "common"]);

    let beta_names: Vec<String> = beta
        .get_items(None)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(beta_names, vec!["common"]);
}
