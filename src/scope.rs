//! Scope partitioning: which slice of the catalog a manager can see
//!
//! Every manager is bound to exactly one tenant scope. The partition visible
//! to that scope is the union of shared (untagged) items and items tagged
//! with the scope; items tagged only for other scopes do not exist as far as
//! this manager is concerned.

use crate::error::{RbacError, Result};
use crate::store::{ItemSelector, PolicyStore};
use crate::types::{Item, ItemId, ItemKind};
use std::collections::HashSet;
use std::sync::Arc;

/// Where the active scope identifier comes from.
///
/// A static string covers most deployments; a resolver callable lets hosts
/// derive the scope at startup (for example from the authenticated tenant).
#[derive(Clone)]
pub enum ScopeSource {
    Static(String),
    Resolver(Arc<dyn Fn() -> String + Send + Sync>),
}

impl ScopeSource {
    /// Resolve the scope once; an empty result is a configuration fault.
    pub fn resolve(&self) -> Result<String> {
        let scope = match self {
            Self::Static(s) => s.clone(),
            Self::Resolver(f) => f(),
        };
        if scope.is_empty() {
            return Err(RbacError::Configuration("Scope not found".to_string()));
        }
        Ok(scope)
    }
}

impl std::fmt::Debug for ScopeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Resolver(_) => f.debug_tuple("Resolver").field(&"<fn>").finish(),
        }
    }
}

impl From<&str> for ScopeSource {
    fn from(s: &str) -> Self {
        Self::Static(s.to_string())
    }
}

impl From<String> for ScopeSource {
    fn from(s: String) -> Self {
        Self::Static(s)
    }
}

/// Scope-filtered view over the policy store.
///
/// All catalog reads the engine performs go through here, so the active
/// scope is an explicit parameter of every query rather than an ambient
/// filter hidden inside the store.
pub struct ScopePartitioner {
    scope: String,
    store: Arc<dyn PolicyStore>,
}

impl ScopePartitioner {
    pub fn new(scope: String, store: Arc<dyn PolicyStore>) -> Self {
        Self { scope, store }
    }

    /// The active scope identifier
    pub fn scope_id(&self) -> &str {
        &self.scope
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// All items visible in the active scope: the shared set plus scoped
    /// items whose names are not taken by a shared item. A shadowed scoped
    /// item is omitted entirely, so hierarchy walks built from this set can
    /// never traverse its edges.
    pub async fn visible_items(&self, kind: Option<ItemKind>) -> Result<Vec<Item>> {
        let mut items = self.store.list_items(kind, ItemSelector::Shared).await?;
        let scoped = self
            .store
            .list_items(kind, ItemSelector::Scoped(&self.scope))
            .await?;
        let taken: HashSet<String> = items.iter().map(|i| i.name.clone()).collect();
        items.extend(scoped.into_iter().filter(|i| !taken.contains(&i.name)));
        Ok(items)
    }

    /// Resolve a name to an item: shared set first, then the scoped set.
    /// An item existing only in a different scope resolves to `None`.
    pub async fn resolve_item(&self, name: &str) -> Result<Option<Item>> {
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(item) = self.store.find_item(name, ItemSelector::Shared).await? {
            return Ok(Some(item));
        }
        self.store
            .find_item(name, ItemSelector::Scoped(&self.scope))
            .await
    }

    /// Resolve a name or fail with the "not in this scope" error mutations use
    pub async fn require_item(&self, name: &str) -> Result<Item> {
        self.resolve_item(name).await?.ok_or_else(|| {
            RbacError::NotFound(format!("Item '{}' not in this scope", name))
        })
    }

    /// Write-time name uniqueness.
    ///
    /// An unscoped item must not collide with any existing unscoped item; a
    /// scoped item must not collide with anything visible in this scope.
    /// `exclude` skips the item being updated.
    pub async fn ensure_unique_name(
        &self,
        name: &str,
        is_scoped: bool,
        exclude: Option<ItemId>,
    ) -> Result<()> {
        let collision = if is_scoped {
            match self.resolve_item(name).await? {
                Some(existing) => exclude != Some(existing.id),
                None => false,
            }
        } else {
            match self.store.find_item(name, ItemSelector::Shared).await? {
                Some(existing) => exclude != Some(existing.id),
                None => false,
            }
        };

        if collision {
            return Err(RbacError::Validation(format!(
                "Item name '{}' is already taken in this scope",
                name
            )));
        }
        Ok(())
    }
}
