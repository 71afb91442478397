//! Abstract policy store: CRUD + filtered queries over the four record kinds
//!
//! The engine treats persistence as an external collaborator. Everything it
//! needs is expressed by the [`PolicyStore`] trait; [`InMemoryPolicyStore`]
//! is the default backend (and the test substrate), a PostgreSQL adapter is
//! available behind the `postgres` feature.

use crate::error::Result;
use crate::types::{Assignment, ChildEdge, Item, ItemId, ItemKind, Rule, ScopeTag};
use async_trait::async_trait;

pub mod memory;
pub use memory::InMemoryPolicyStore;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresPolicyStore;

/// Which partition of the item catalog a query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSelector<'a> {
    /// Items without any scope tag, visible to every scope
    Shared,
    /// Items tagged with the given scope
    Scoped(&'a str),
}

/// Edge query filter; `None` means unconstrained on that side
#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub parent_ids: Option<Vec<ItemId>>,
    pub child_ids: Option<Vec<ItemId>>,
}

impl EdgeFilter {
    pub fn parents(ids: Vec<ItemId>) -> Self {
        Self {
            parent_ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn children(ids: Vec<ItemId>) -> Self {
        Self {
            child_ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn pair(parent_id: ItemId, child_id: ItemId) -> Self {
        Self {
            parent_ids: Some(vec![parent_id]),
            child_ids: Some(vec![child_id]),
        }
    }

    /// Whether an edge passes the filter
    pub fn matches(&self, edge: &ChildEdge) -> bool {
        self.parent_ids
            .as_ref()
            .map_or(true, |ids| ids.contains(&edge.parent_id))
            && self
                .child_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&edge.child_id))
    }
}

/// Assignment deletion/query filter; `None` means unconstrained
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub user_id: Option<String>,
    pub item_ids: Option<Vec<ItemId>>,
}

impl AssignmentFilter {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn items(ids: Vec<ItemId>) -> Self {
        Self {
            item_ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn pair(item_id: ItemId, user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            item_ids: Some(vec![item_id]),
        }
    }

    pub fn matches(&self, assignment: &Assignment) -> bool {
        self.user_id
            .as_ref()
            .map_or(true, |u| *u == assignment.user_id)
            && self
                .item_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&assignment.item_id))
    }
}

/// Scope tag deletion filter
#[derive(Debug, Clone, Default)]
pub struct ScopeTagFilter {
    pub scope_id: Option<String>,
    pub item_ids: Option<Vec<ItemId>>,
}

impl ScopeTagFilter {
    pub fn scope(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: Some(scope_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, tag: &ScopeTag) -> bool {
        self.scope_id.as_ref().map_or(true, |s| *s == tag.scope_id)
            && self
                .item_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&tag.item_id))
    }
}

/// Durable storage for the policy catalog.
///
/// Implementations own write consistency (unique constraints on names, edge
/// pairs and assignment pairs); `save_edge` and `save_assignment` on an
/// existing key are no-op successes. All failures surface as
/// [`RbacError::Store`](crate::error::RbacError::Store).
#[async_trait]
pub trait PolicyStore: Send + Sync {
    // --- items ---

    /// Find one item by name within the selected partition
    async fn find_item(&self, name: &str, selector: ItemSelector<'_>) -> Result<Option<Item>>;

    /// List items of a kind (or all kinds) within the selected partition
    async fn list_items(
        &self,
        kind: Option<ItemKind>,
        selector: ItemSelector<'_>,
    ) -> Result<Vec<Item>>;

    /// Insert or update an item, keyed by id
    async fn save_item(&self, item: &Item) -> Result<()>;

    /// Delete an item row; edges/assignments/tags are the caller's problem
    async fn delete_item(&self, id: ItemId) -> Result<()>;

    /// Rewrite every `rule_name` reference from `old` to `new` (or clear it).
    /// Returns the number of items touched.
    async fn retarget_rule(&self, old: &str, new: Option<&str>) -> Result<u64>;

    // --- rules ---

    async fn find_rule(&self, name: &str) -> Result<Option<Rule>>;

    async fn list_rules(&self) -> Result<Vec<Rule>>;

    /// Insert or update a rule, keyed by name
    async fn save_rule(&self, rule: &Rule) -> Result<()>;

    async fn delete_rule(&self, name: &str) -> Result<()>;

    // --- child edges ---

    async fn list_edges(&self, filter: EdgeFilter) -> Result<Vec<ChildEdge>>;

    /// Idempotent: saving an existing pair succeeds without effect
    async fn save_edge(&self, edge: &ChildEdge) -> Result<()>;

    /// Returns the number of edges removed
    async fn delete_edges(&self, filter: EdgeFilter) -> Result<u64>;

    // --- assignments ---

    async fn find_assignment(&self, item_id: ItemId, user_id: &str)
        -> Result<Option<Assignment>>;

    /// List a user's assignments, optionally restricted to an item id set
    async fn list_assignments(
        &self,
        user_id: &str,
        item_ids: Option<&[ItemId]>,
    ) -> Result<Vec<Assignment>>;

    /// List every assignment of one item (for user-by-role queries)
    async fn list_assignments_for_item(&self, item_id: ItemId) -> Result<Vec<Assignment>>;

    /// Idempotent: saving an existing pair succeeds without effect
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;

    /// Returns the number of assignments removed
    async fn delete_assignments(&self, filter: AssignmentFilter) -> Result<u64>;

    // --- scope tags ---

    async fn list_scope_tags(
        &self,
        scope_id: &str,
        item_ids: Option<&[ItemId]>,
    ) -> Result<Vec<ScopeTag>>;

    async fn save_scope_tag(&self, tag: &ScopeTag) -> Result<()>;

    async fn delete_scope_tags(&self, filter: ScopeTagFilter) -> Result<u64>;
}
