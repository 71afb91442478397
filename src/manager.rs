//! The authorization manager: access checks, hierarchy mutation and queries
//!
//! One [`RbacManager`] is bound to one scope and one policy store. Checks
//! are read-only and safe to issue concurrently; mutations invalidate the
//! derived caches before returning, so the next check in the same process
//! observes the change.

use crate::assignments::{AssignmentCache, UserAssignments, DEFAULT_ASSIGNMENT_CAPACITY};
use crate::error::{RbacError, Result};
use crate::hierarchy::ChildIndex;
use crate::rule::RuleRegistry;
use crate::scope::{ScopePartitioner, ScopeSource};
use crate::snapshot::{ExternalCache, Snapshot, SnapshotCache, DEFAULT_CACHE_PREFIX};
use crate::store::{
    AssignmentFilter, EdgeFilter, ItemSelector, PolicyStore, ScopeTagFilter,
};
use crate::types::{
    Assignment, CheckParams, ChildEdge, Item, ItemId, ItemKind, Rule, ScopeTag,
};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builder for [`RbacManager`]
pub struct RbacManagerBuilder {
    store: Arc<dyn PolicyStore>,
    scope: ScopeSource,
    cache_prefix: String,
    external_cache: Option<Arc<dyn ExternalCache>>,
    snapshot_enabled: bool,
    default_roles: Vec<String>,
    registry: Arc<RuleRegistry>,
    assignment_capacity: usize,
}

impl RbacManagerBuilder {
    fn new(store: Arc<dyn PolicyStore>, scope: impl Into<ScopeSource>) -> Self {
        Self {
            store,
            scope: scope.into(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            external_cache: None,
            snapshot_enabled: true,
            default_roles: Vec::new(),
            registry: Arc::new(RuleRegistry::new()),
            assignment_capacity: DEFAULT_ASSIGNMENT_CAPACITY,
        }
    }

    /// Roles implicitly granted to every user (supplied by the host)
    pub fn default_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Key prefix used when a shared external cache is configured
    pub fn cache_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cache_prefix = prefix.into();
        self
    }

    /// Wire up a shared external cache for the snapshot triple
    pub fn external_cache(mut self, cache: Arc<dyn ExternalCache>) -> Self {
        self.external_cache = Some(cache);
        self
    }

    /// Disable snapshot caching; every check rebuilds its view from the
    /// store, trading latency for freshness.
    pub fn without_snapshot_cache(mut self) -> Self {
        self.snapshot_enabled = false;
        self
    }

    /// Replace the rule registry (e.g. one preloaded with host rule kinds)
    pub fn rule_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Bound on the number of users memoized in the assignment cache
    pub fn assignment_capacity(mut self, capacity: usize) -> Self {
        self.assignment_capacity = capacity;
        self
    }

    /// Resolve the scope and build the manager.
    ///
    /// Fails with [`RbacError::Configuration`] when the scope resolves to an
    /// empty string or the assignment capacity is zero.
    pub fn build(self) -> Result<RbacManager> {
        let scope = self.scope.resolve()?;
        let capacity = NonZeroUsize::new(self.assignment_capacity).ok_or_else(|| {
            RbacError::Configuration("Assignment cache capacity must be non-zero".to_string())
        })?;
        if self.default_roles.iter().any(String::is_empty) {
            return Err(RbacError::Configuration(
                "Default role names must not be empty".to_string(),
            ));
        }

        let snapshot = self.snapshot_enabled.then(|| {
            SnapshotCache::new(&self.cache_prefix, &scope, self.external_cache.clone())
        });

        info!(
            scope = %scope,
            snapshot_cache = self.snapshot_enabled,
            external_cache = self.external_cache.is_some(),
            "authorization manager initialized"
        );

        Ok(RbacManager {
            partitioner: ScopePartitioner::new(scope, self.store),
            registry: self.registry,
            snapshot,
            assignments: AssignmentCache::new(capacity),
            default_roles: self.default_roles,
        })
    }
}

/// Scope-bound authorization manager over a policy store
pub struct RbacManager {
    partitioner: ScopePartitioner,
    registry: Arc<RuleRegistry>,
    snapshot: Option<SnapshotCache>,
    assignments: AssignmentCache,
    default_roles: Vec<String>,
}

impl std::fmt::Debug for RbacManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacManager")
            .field("scope", &self.partitioner.scope_id())
            .field("snapshot_cache", &self.snapshot.is_some())
            .field("default_roles", &self.default_roles)
            .finish_non_exhaustive()
    }
}

impl RbacManager {
    /// Start building a manager for the given store and scope
    pub fn builder(
        store: Arc<dyn PolicyStore>,
        scope: impl Into<ScopeSource>,
    ) -> RbacManagerBuilder {
        RbacManagerBuilder::new(store, scope)
    }

    /// The active scope identifier
    pub fn scope_id(&self) -> &str {
        self.partitioner.scope_id()
    }

    /// The rule registry, for registering host-defined rule kinds
    pub fn rule_registry(&self) -> &RuleRegistry {
        &self.registry
    }

    fn store(&self) -> &Arc<dyn PolicyStore> {
        self.partitioner.store()
    }

    // ------------------------------------------------------------------
    // Access checking
    // ------------------------------------------------------------------

    /// Decide whether `user_id` may exercise `permission_name`.
    ///
    /// Missing items, failed rules and exhausted hierarchies all fold into
    /// `false`; only store faults surface as errors.
    pub async fn check_access(
        &self,
        user_id: &str,
        permission_name: &str,
        params: &CheckParams,
    ) -> Result<bool> {
        if user_id.is_empty() {
            return Ok(false);
        }

        let assignments = self.load_assignments(user_id).await?;

        // An unassigned user without default roles can never pass a check
        if assignments.is_empty() && self.default_roles.is_empty() {
            return Ok(false);
        }

        let snapshot = match &self.snapshot {
            Some(cache) => cache.load(&self.partitioner).await?,
            // Cache-less operation: a fresh view per check
            None => Arc::new(Snapshot::build(&self.partitioner).await?),
        };

        let mut params = params.clone();
        params.insert("user".to_string(), json!(user_id));

        Ok(self.decide(user_id, permission_name, &params, &assignments, &snapshot))
    }

    /// Recursive decision: rule veto, then direct/default grant, then a pure
    /// OR across the item's parents. Terminates because the hierarchy is
    /// kept acyclic at write time.
    fn decide(
        &self,
        user_id: &str,
        item_name: &str,
        params: &CheckParams,
        assignments: &UserAssignments,
        snapshot: &Snapshot,
    ) -> bool {
        let Some(item) = snapshot.items.get(item_name) else {
            return false;
        };

        debug!("Checking {}: {}", item.kind, item_name);

        if let Some(rule_name) = &item.rule_name {
            let Some(rule) = snapshot.rules.get(rule_name) else {
                warn!(rule = %rule_name, item = %item_name, "item references a missing rule, denying");
                return false;
            };
            match self.registry.evaluate(&rule.payload, user_id, item, params) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!(rule = %rule_name, item = %item_name, error = %e, "rule evaluation failed, denying");
                    return false;
                }
            }
        }

        if assignments.contains_key(item_name)
            || self.default_roles.iter().any(|r| r == item_name)
        {
            return true;
        }

        snapshot
            .parents(item_name)
            .iter()
            .any(|parent| self.decide(user_id, parent, params, assignments, snapshot))
    }

    async fn load_assignments(&self, user_id: &str) -> Result<UserAssignments> {
        if let Some(cached) = self.assignments.get(user_id) {
            return Ok(cached);
        }
        let assignments = Arc::new(self.fetch_assignments(user_id).await?);
        self.assignments.insert(user_id, assignments.clone());
        Ok(assignments)
    }

    /// Direct assignments of visible items, keyed by item name
    async fn fetch_assignments(&self, user_id: &str) -> Result<HashMap<String, Assignment>> {
        let items = self.partitioner.visible_items(None).await?;
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let names: HashMap<ItemId, &str> =
            items.iter().map(|i| (i.id, i.name.as_str())).collect();

        let rows = self.store().list_assignments(user_id, Some(&ids)).await?;
        Ok(rows
            .into_iter()
            .filter_map(|a| names.get(&a.item_id).map(|n| (n.to_string(), a)))
            .collect())
    }

    // ------------------------------------------------------------------
    // Item CRUD
    // ------------------------------------------------------------------

    /// Persist a new item; scoped items are tagged for the active scope.
    pub async fn add_item(&self, item: Item) -> Result<()> {
        if item.name.is_empty() {
            return Err(RbacError::Validation("Item name must not be empty".to_string()));
        }
        self.partitioner
            .ensure_unique_name(&item.name, item.is_scoped, None)
            .await?;
        self.ensure_rule_exists(item.rule_name.as_deref()).await?;

        self.store().save_item(&item).await?;
        if item.is_scoped {
            self.store()
                .save_scope_tag(&ScopeTag::new(item.id, self.scope_id()))
                .await?;
        }

        info!(item = %item.name, kind = %item.kind, "added auth item");
        self.invalidate_derived().await
    }

    /// Update the item currently known as `name`. The id, creation time and
    /// scoping of the existing row are preserved; a rename is revalidated
    /// against the uniqueness rules.
    pub async fn update_item(&self, name: &str, item: Item) -> Result<()> {
        let existing = self.partitioner.require_item(name).await?;
        let scoped = !self
            .store()
            .list_scope_tags(self.scope_id(), Some(&[existing.id]))
            .await?
            .is_empty();

        if item.name != name {
            self.partitioner
                .ensure_unique_name(&item.name, scoped, Some(existing.id))
                .await?;
        }
        self.ensure_rule_exists(item.rule_name.as_deref()).await?;

        let updated = Item {
            id: existing.id,
            created_at: existing.created_at,
            updated_at: Utc::now(),
            is_scoped: scoped,
            ..item
        };
        self.store().save_item(&updated).await?;

        info!(item = %name, "updated auth item");
        self.invalidate_derived().await
    }

    /// Remove an item along with its edges, assignments and scope tags.
    /// The abstract store promises no cascade, so the cleanup is explicit.
    pub async fn remove_item(&self, name: &str) -> Result<()> {
        let item = self.partitioner.require_item(name).await?;

        self.store()
            .delete_edges(EdgeFilter::parents(vec![item.id]))
            .await?;
        self.store()
            .delete_edges(EdgeFilter::children(vec![item.id]))
            .await?;
        self.store()
            .delete_assignments(AssignmentFilter::items(vec![item.id]))
            .await?;
        self.store()
            .delete_scope_tags(ScopeTagFilter {
                scope_id: None,
                item_ids: Some(vec![item.id]),
            })
            .await?;
        self.store().delete_item(item.id).await?;

        info!(item = %name, "removed auth item");
        self.invalidate_derived().await
    }

    /// Look a name up in the visible partition
    pub async fn get_item(&self, name: &str) -> Result<Option<Item>> {
        self.partitioner.resolve_item(name).await
    }

    /// Visible role by name
    pub async fn get_role(&self, name: &str) -> Result<Option<Item>> {
        Ok(self
            .partitioner
            .resolve_item(name)
            .await?
            .filter(Item::is_role))
    }

    /// Visible permission by name
    pub async fn get_permission(&self, name: &str) -> Result<Option<Item>> {
        Ok(self
            .partitioner
            .resolve_item(name)
            .await?
            .filter(Item::is_permission))
    }

    /// All visible items, optionally restricted to one kind
    pub async fn get_items(&self, kind: Option<ItemKind>) -> Result<Vec<Item>> {
        self.partitioner.visible_items(kind).await
    }

    /// All visible roles
    pub async fn get_roles(&self) -> Result<Vec<Item>> {
        self.get_items(Some(ItemKind::Role)).await
    }

    /// All visible permissions
    pub async fn get_permissions(&self) -> Result<Vec<Item>> {
        self.get_items(Some(ItemKind::Permission)).await
    }

    async fn ensure_rule_exists(&self, rule_name: Option<&str>) -> Result<()> {
        if let Some(rule_name) = rule_name {
            if self.store().find_rule(rule_name).await?.is_none() {
                return Err(RbacError::NotFound(format!("Rule '{}' not found", rule_name)));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rule CRUD
    // ------------------------------------------------------------------

    /// Persist a new rule; the payload must be valid for its kind.
    pub async fn add_rule(&self, rule: Rule) -> Result<()> {
        if rule.name.is_empty() {
            return Err(RbacError::Validation("Rule name must not be empty".to_string()));
        }
        if self.store().find_rule(&rule.name).await?.is_some() {
            return Err(RbacError::Validation(format!(
                "Rule '{}' already exists",
                rule.name
            )));
        }
        self.registry.validate(&rule.payload)?;

        self.store().save_rule(&rule).await?;
        info!(rule = %rule.name, kind = %rule.payload.kind, "added rule");
        self.invalidate_derived().await
    }

    /// Update the rule currently known as `name`; a rename retargets every
    /// item referencing the old name.
    pub async fn update_rule(&self, name: &str, rule: Rule) -> Result<()> {
        let existing = self
            .store()
            .find_rule(name)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("Rule '{}' not found", name)))?;
        self.registry.validate(&rule.payload)?;

        if rule.name != name {
            self.store().retarget_rule(name, Some(&rule.name)).await?;
            self.store().delete_rule(name).await?;
        }

        let updated = Rule {
            created_at: existing.created_at,
            updated_at: Utc::now(),
            ..rule
        };
        self.store().save_rule(&updated).await?;

        info!(rule = %name, "updated rule");
        self.invalidate_derived().await
    }

    /// Remove a rule, clearing the reference on every item that used it
    pub async fn remove_rule(&self, name: &str) -> Result<()> {
        if self.store().find_rule(name).await?.is_none() {
            return Err(RbacError::NotFound(format!("Rule '{}' not found", name)));
        }

        self.store().retarget_rule(name, None).await?;
        self.store().delete_rule(name).await?;

        info!(rule = %name, "removed rule");
        self.invalidate_derived().await
    }

    pub async fn get_rule(&self, name: &str) -> Result<Option<Rule>> {
        self.store().find_rule(name).await
    }

    pub async fn get_rules(&self) -> Result<Vec<Rule>> {
        self.store().list_rules().await
    }

    // ------------------------------------------------------------------
    // Hierarchy mutation
    // ------------------------------------------------------------------

    /// Whether `add_child` would be accepted for this pair: both endpoints
    /// must be visible, and the edge must not close a cycle.
    pub async fn can_add_child(&self, parent: &str, child: &str) -> Result<bool> {
        let (_, _, index) = self.edge_endpoints(parent, child).await?;
        Ok(!index.would_cycle(parent, child))
    }

    /// Create a `parent -> child` grant edge.
    ///
    /// Self-loops and a permission parenting a role are validation faults;
    /// an edge that would close a cycle is a [`RbacError::Cycle`]; endpoints
    /// invisible in the active scope are [`RbacError::NotFound`]. Re-adding
    /// an existing edge is a no-op success.
    pub async fn add_child(&self, parent: &str, child: &str) -> Result<()> {
        if parent == child {
            return Err(RbacError::Validation(format!(
                "Cannot add '{}' as a child of itself",
                parent
            )));
        }

        let (parent_item, child_item, index) = self.edge_endpoints(parent, child).await?;

        if parent_item.is_permission() && child_item.is_role() {
            return Err(RbacError::Validation(
                "Cannot add a role as a child of a permission".to_string(),
            ));
        }

        if index.would_cycle(parent, child) {
            return Err(RbacError::Cycle {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        self.store()
            .save_edge(&ChildEdge::new(parent_item.id, child_item.id))
            .await?;

        info!(parent = %parent, child = %child, "added child edge");
        self.invalidate_derived().await
    }

    /// Delete the edge if present; returns whether a row was removed
    pub async fn remove_child(&self, parent: &str, child: &str) -> Result<bool> {
        let parent_item = self.partitioner.require_item(parent).await?;
        let child_item = self.partitioner.require_item(child).await?;

        let removed = self
            .store()
            .delete_edges(EdgeFilter::pair(parent_item.id, child_item.id))
            .await?;

        self.invalidate_derived().await?;
        Ok(removed > 0)
    }

    /// Delete all outgoing edges of `parent`; returns whether any were removed
    pub async fn remove_children(&self, parent: &str) -> Result<bool> {
        let parent_item = self.partitioner.require_item(parent).await?;

        let removed = self
            .store()
            .delete_edges(EdgeFilter::parents(vec![parent_item.id]))
            .await?;

        self.invalidate_derived().await?;
        Ok(removed > 0)
    }

    /// Existence check on the edge; unresolved endpoints are simply `false`
    pub async fn has_child(&self, parent: &str, child: &str) -> Result<bool> {
        let Some(parent_item) = self.partitioner.resolve_item(parent).await? else {
            return Ok(false);
        };
        let Some(child_item) = self.partitioner.resolve_item(child).await? else {
            return Ok(false);
        };
        let edges = self
            .store()
            .list_edges(EdgeFilter::pair(parent_item.id, child_item.id))
            .await?;
        Ok(!edges.is_empty())
    }

    /// Resolve both endpoints and build the visible child index for cycle
    /// analysis in one round of store queries.
    async fn edge_endpoints(
        &self,
        parent: &str,
        child: &str,
    ) -> Result<(Item, Item, ChildIndex)> {
        let items = self.partitioner.visible_items(None).await?;
        let parent_item = items
            .iter()
            .find(|i| i.name == parent)
            .cloned()
            .ok_or_else(|| {
                RbacError::NotFound(format!("Item '{}' not in this scope", parent))
            })?;
        let child_item = items
            .iter()
            .find(|i| i.name == child)
            .cloned()
            .ok_or_else(|| RbacError::NotFound(format!("Item '{}' not in this scope", child)))?;

        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let edges = self
            .store()
            .list_edges(EdgeFilter {
                parent_ids: Some(ids.clone()),
                child_ids: Some(ids),
            })
            .await?;

        Ok((parent_item, child_item, ChildIndex::build(&items, &edges)))
    }

    // ------------------------------------------------------------------
    // Hierarchy queries
    // ------------------------------------------------------------------

    /// Immediate children of an item
    pub async fn get_children(&self, name: &str) -> Result<Vec<Item>> {
        let item = self.partitioner.require_item(name).await?;
        let items = self.partitioner.visible_items(None).await?;
        let by_id: HashMap<ItemId, &Item> = items.iter().map(|i| (i.id, i)).collect();

        let edges = self
            .store()
            .list_edges(EdgeFilter::parents(vec![item.id]))
            .await?;
        Ok(edges
            .into_iter()
            .filter_map(|e| by_id.get(&e.child_id).map(|i| (*i).clone()))
            .collect())
    }

    /// The role itself plus every role reachable beneath it
    pub async fn get_child_roles(&self, name: &str) -> Result<Vec<Item>> {
        let role = self
            .get_role(name)
            .await?
            .ok_or_else(|| RbacError::NotFound(format!("Role '{}' not found", name)))?;

        let (items, index) = self.visible_index().await?;
        let reachable = index.descendants(name);

        let mut roles = vec![role];
        roles.extend(
            items
                .into_iter()
                .filter(|i| i.is_role() && reachable.contains(&i.name)),
        );
        Ok(roles)
    }

    /// Every permission reachable from the named item
    pub async fn get_permissions_by_role(&self, name: &str) -> Result<Vec<Item>> {
        let (items, index) = self.visible_index().await?;
        let reachable = index.descendants(name);

        Ok(items
            .into_iter()
            .filter(|i| i.is_permission() && reachable.contains(&i.name))
            .collect())
    }

    async fn visible_index(&self) -> Result<(Vec<Item>, ChildIndex)> {
        let items = self.partitioner.visible_items(None).await?;
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let edges = self
            .store()
            .list_edges(EdgeFilter {
                parent_ids: Some(ids.clone()),
                child_ids: Some(ids),
            })
            .await?;
        let index = ChildIndex::build(&items, &edges);
        Ok((items, index))
    }

    // ------------------------------------------------------------------
    // User-centric queries
    // ------------------------------------------------------------------

    /// Roles held by a user: direct role assignments plus the default roles
    pub async fn get_roles_by_user(&self, user_id: &str) -> Result<Vec<Item>> {
        if user_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut roles: HashMap<String, Item> = HashMap::new();
        for name in &self.default_roles {
            if let Some(role) = self.get_role(name).await? {
                roles.insert(role.name.clone(), role);
            }
        }

        let assigned = self.fetch_assignments(user_id).await?;
        let items = self.partitioner.visible_items(Some(ItemKind::Role)).await?;
        for item in items {
            if assigned.contains_key(&item.name) {
                roles.insert(item.name.clone(), item);
            }
        }

        Ok(roles.into_values().collect())
    }

    /// Every permission a user holds, directly or through the hierarchy
    pub async fn get_permissions_by_user(&self, user_id: &str) -> Result<Vec<Item>> {
        if user_id.is_empty() {
            return Ok(Vec::new());
        }

        let assigned = self.fetch_assignments(user_id).await?;
        let (items, index) = self.visible_index().await?;

        let mut reachable: std::collections::HashSet<String> =
            assigned.keys().cloned().collect();
        for name in assigned.keys() {
            reachable.extend(index.descendants(name));
        }

        Ok(items
            .into_iter()
            .filter(|i| i.is_permission() && reachable.contains(&i.name))
            .collect())
    }

    /// Ids of every user the role is assigned to
    pub async fn get_user_ids_by_role(&self, name: &str) -> Result<Vec<String>> {
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let item = self.partitioner.require_item(name).await?;
        let rows = self.store().list_assignments_for_item(item.id).await?;
        Ok(rows.into_iter().map(|a| a.user_id).collect())
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    /// Grant an item to a user. Duplicate grants are a validation fault.
    pub async fn assign(&self, name: &str, user_id: &str) -> Result<Assignment> {
        if user_id.is_empty() {
            return Err(RbacError::Validation("User id must not be empty".to_string()));
        }
        let item = self.partitioner.require_item(name).await?;

        if self
            .store()
            .find_assignment(item.id, user_id)
            .await?
            .is_some()
        {
            return Err(RbacError::Validation(format!(
                "'{}' is already assigned to user '{}'",
                name, user_id
            )));
        }

        let assignment = Assignment::new(item.id, user_id);
        self.store().save_assignment(&assignment).await?;
        self.assignments.invalidate_user(user_id);

        info!(item = %name, user = %user_id, "assigned item to user");
        Ok(assignment)
    }

    /// Revoke a grant; returns whether one existed
    pub async fn revoke(&self, name: &str, user_id: &str) -> Result<bool> {
        if user_id.is_empty() {
            return Ok(false);
        }
        self.assignments.invalidate_user(user_id);

        let Some(item) = self.partitioner.resolve_item(name).await? else {
            return Ok(false);
        };
        let removed = self
            .store()
            .delete_assignments(AssignmentFilter::pair(item.id, user_id))
            .await?;
        Ok(removed > 0)
    }

    /// Revoke every visible grant a user holds; returns whether any existed
    pub async fn revoke_all(&self, user_id: &str) -> Result<bool> {
        if user_id.is_empty() {
            return Ok(false);
        }
        self.assignments.invalidate_user(user_id);

        let items = self.partitioner.visible_items(None).await?;
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let removed = self
            .store()
            .delete_assignments(AssignmentFilter {
                user_id: Some(user_id.to_string()),
                item_ids: Some(ids),
            })
            .await?;
        Ok(removed > 0)
    }

    /// One user's grant of one item, if present
    pub async fn get_assignment(&self, name: &str, user_id: &str) -> Result<Option<Assignment>> {
        if user_id.is_empty() {
            return Ok(None);
        }
        let Some(item) = self.partitioner.resolve_item(name).await? else {
            return Ok(None);
        };
        self.store().find_assignment(item.id, user_id).await
    }

    /// All of a user's visible grants, keyed by item name
    pub async fn get_assignments(&self, user_id: &str) -> Result<HashMap<String, Assignment>> {
        if user_id.is_empty() {
            return Ok(HashMap::new());
        }
        self.fetch_assignments(user_id).await
    }

    // ------------------------------------------------------------------
    // Bulk removal (scope-local: shared items always survive)
    // ------------------------------------------------------------------

    /// Remove every item owned by the active scope, with its edges,
    /// assignments and tags.
    pub async fn remove_all(&self) -> Result<()> {
        let tags = self.store().list_scope_tags(self.scope_id(), None).await?;
        let ids: Vec<ItemId> = tags.iter().map(|t| t.item_id).collect();
        self.remove_items_by_ids(&ids).await?;

        info!(scope = %self.scope_id(), "removed all scope-owned items");
        self.invalidate_derived().await
    }

    /// Remove every scope-owned role
    pub async fn remove_all_roles(&self) -> Result<()> {
        self.remove_all_of_kind(ItemKind::Role).await
    }

    /// Remove every scope-owned permission
    pub async fn remove_all_permissions(&self) -> Result<()> {
        self.remove_all_of_kind(ItemKind::Permission).await
    }

    async fn remove_all_of_kind(&self, kind: ItemKind) -> Result<()> {
        let items = self
            .store()
            .list_items(Some(kind), ItemSelector::Scoped(self.scope_id()))
            .await?;
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        self.remove_items_by_ids(&ids).await?;

        info!(scope = %self.scope_id(), kind = %kind, "removed scope-owned items of kind");
        self.invalidate_derived().await
    }

    async fn remove_items_by_ids(&self, ids: &[ItemId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store()
            .delete_assignments(AssignmentFilter::items(ids.to_vec()))
            .await?;
        self.store()
            .delete_edges(EdgeFilter::parents(ids.to_vec()))
            .await?;
        self.store()
            .delete_edges(EdgeFilter::children(ids.to_vec()))
            .await?;
        self.store()
            .delete_scope_tags(ScopeTagFilter {
                scope_id: None,
                item_ids: Some(ids.to_vec()),
            })
            .await?;
        for id in ids {
            self.store().delete_item(*id).await?;
        }
        Ok(())
    }

    /// Detach rules from every scope-owned item. Rule records themselves are
    /// left in place; shared items keep their rules.
    pub async fn remove_all_rules(&self) -> Result<()> {
        let items = self
            .store()
            .list_items(None, ItemSelector::Scoped(self.scope_id()))
            .await?;
        for mut item in items {
            if item.rule_name.take().is_some() {
                self.store().save_item(&item).await?;
            }
        }

        info!(scope = %self.scope_id(), "cleared rules from scope-owned items");
        self.invalidate_derived().await
    }

    /// Drop every assignment of a scope-owned item
    pub async fn remove_all_assignments(&self) -> Result<()> {
        let tags = self.store().list_scope_tags(self.scope_id(), None).await?;
        let ids: Vec<ItemId> = tags.iter().map(|t| t.item_id).collect();
        if !ids.is_empty() {
            self.store()
                .delete_assignments(AssignmentFilter::items(ids))
                .await?;
        }
        self.assignments.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cache control
    // ------------------------------------------------------------------

    /// Drop the snapshot (in process and in the external cache) and the
    /// whole assignment cache; the next read rebuilds from the store.
    pub async fn invalidate_cache(&self) -> Result<()> {
        self.invalidate_derived().await
    }

    async fn invalidate_derived(&self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot {
            snapshot.invalidate().await?;
        }
        self.assignments.clear();
        Ok(())
    }
}
