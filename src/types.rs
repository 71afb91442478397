//! Core catalog types: items, rules, assignments, edges and scope tags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Unique item identifier
pub type ItemId = Uuid;

/// Name-value pairs handed to rule evaluation alongside a check.
/// The engine injects a `"user"` entry holding the user id before
/// any rule sees the map.
pub type CheckParams = HashMap<String, Value>;

/// Whether an item grants as a role or as a permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemKind {
    /// A role can parent other roles and permissions
    Role,
    /// A permission may only parent other permissions
    Permission,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Role => write!(f, "role"),
            Self::Permission => write!(f, "permission"),
        }
    }
}

/// A Role or Permission node in the authorization catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier; edges, assignments and scope tags reference it
    pub id: ItemId,

    /// Catalog name, unique within the item's partition (see scope rules)
    pub name: String,

    /// Role or Permission
    pub kind: ItemKind,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional rule gating access to this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,

    /// Opaque payload attached by the host application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Scoped items are tagged with exactly one tenant scope;
    /// unscoped items are shared across every scope.
    #[serde(default)]
    pub is_scoped: bool,
}

impl Item {
    /// Create a new item with fresh timestamps
    pub fn new(name: impl Into<String>, kind: ItemKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            description: None,
            rule_name: None,
            data: None,
            created_at: now,
            updated_at: now,
            is_scoped: false,
        }
    }

    /// Shorthand for a role item
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Role)
    }

    /// Shorthand for a permission item
    pub fn permission(name: impl Into<String>) -> Self {
        Self::new(name, ItemKind::Permission)
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Gate this item behind a named rule
    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    /// Attach an opaque data payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Tag this item for the manager's active scope on insert
    pub fn scoped(mut self) -> Self {
        self.is_scoped = true;
        self
    }

    pub fn is_role(&self) -> bool {
        self.kind == ItemKind::Role
    }

    pub fn is_permission(&self) -> bool {
        self.kind == ItemKind::Permission
    }
}

/// Tagged, versioned rule payload.
///
/// `kind` selects the evaluator in the [`RuleRegistry`](crate::rule::RuleRegistry);
/// `config` is whatever that evaluator expects. Persisting a tag + version
/// instead of a serialized native object keeps the storage format independent
/// of any one runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePayload {
    pub kind: String,
    #[serde(default = "RulePayload::default_version")]
    pub version: u32,
    #[serde(default)]
    pub config: Value,
}

impl RulePayload {
    fn default_version() -> u32 {
        1
    }

    /// Payload for the built-in CEL rule kind
    pub fn cel(expression: impl Into<String>) -> Self {
        Self {
            kind: "cel".to_string(),
            version: 1,
            config: serde_json::json!({ "expression": expression.into() }),
        }
    }
}

/// A named, reusable boolean predicate attachable to items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub payload: RulePayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Create a rule with fresh timestamps
    pub fn new(name: impl Into<String>, payload: RulePayload) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A direct grant of an item to a user, unique per (item, user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub item_id: ItemId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn new(item_id: ItemId, user_id: impl Into<String>) -> Self {
        Self {
            item_id,
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// A directed "grants" edge from a parent item to a child item.
/// The edge set over any one partition must stay acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildEdge {
    pub parent_id: ItemId,
    pub child_id: ItemId,
}

impl ChildEdge {
    pub fn new(parent_id: ItemId, child_id: ItemId) -> Self {
        Self {
            parent_id,
            child_id,
        }
    }
}

/// Associates an item with one tenant scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTag {
    pub item_id: ItemId,
    pub scope_id: String,
    pub created_at: DateTime<Utc>,
}

impl ScopeTag {
    pub fn new(item_id: ItemId, scope_id: impl Into<String>) -> Self {
        Self {
            item_id,
            scope_id: scope_id.into(),
            created_at: Utc::now(),
        }
    }
}
