//! # Scoped RBAC
//!
//! Role-based access control with hierarchical grants, dynamic rules and
//! multi-tenant scope partitioning.
//!
//! ## Features
//!
//! - **Role/permission hierarchy** as a DAG with cycle rejection at write time
//! - **Dynamic rules** with CEL (Common Expression Language) predicates and
//!   pluggable host-defined rule kinds
//! - **Scope partitioning**: shared items visible everywhere, scoped items
//!   visible only inside their tenant scope
//! - **Snapshot caching** of the item/rule/parent triple, with an optional
//!   shared external cache, plus per-user assignment memoization
//! - **Async-first design** using the Tokio runtime
//! - **Pluggable storage** behind [`PolicyStore`]; in-memory store built in,
//!   PostgreSQL behind the `postgres` feature
//!
//! ## Example
//!
//! ```rust
//! use scoped_rbac::{InMemoryPolicyStore, Item, RbacManager};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryPolicyStore::default());
//!     let manager = RbacManager::builder(store, "tenant-1").build()?;
//!
//!     manager.add_item(Item::role("editor")).await?;
//!     manager.add_item(Item::permission("update-post")).await?;
//!     manager.add_child("editor", "update-post").await?;
//!     manager.assign("editor", "alice").await?;
//!
//!     let allowed = manager
//!         .check_access("alice", "update-post", &HashMap::new())
//!         .await?;
//!     assert!(allowed);
//!
//!     Ok(())
//! }
//! ```

pub mod assignments;
pub mod error;
pub mod hierarchy;
pub mod manager;
pub mod rule;
pub mod scope;
pub mod snapshot;
pub mod store;
pub mod types;

// Re-export the types most hosts touch
pub use error::{RbacError, Result};
pub use manager::{RbacManager, RbacManagerBuilder};
pub use rule::{CelRule, RuleEvaluator, RuleRegistry};
pub use scope::ScopeSource;
pub use snapshot::{ExternalCache, Snapshot};
pub use store::{InMemoryPolicyStore, ItemSelector, PolicyStore};
#[cfg(feature = "postgres")]
pub use store::PostgresPolicyStore;
pub use types::{
    Assignment, CheckParams, ChildEdge, Item, ItemId, ItemKind, Rule, RulePayload, ScopeTag,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
