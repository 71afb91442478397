//! Scope-qualified policy snapshot and its cache coherence protocol
//!
//! A [`Snapshot`] is the immutable triple the check engine traverses:
//! visible items by name, rules by name, and the inverted parent index.
//! It is built wholesale and published atomically; an in-flight check holds
//! its own `Arc` and is never affected by a concurrent invalidation.

use crate::error::{RbacError, Result};
use crate::hierarchy::ChildIndex;
use crate::scope::ScopePartitioner;
use crate::store::EdgeFilter;
use crate::types::{Item, ItemId, Rule};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default cache key prefix; the full key is `"<prefix>_<scope>"`.
pub const DEFAULT_CACHE_PREFIX: &str = "rbac";

/// Optional shared key/value cache (Redis, memcached, ...) holding the
/// serialized snapshot so that sibling processes skip the rebuild.
#[async_trait]
pub trait ExternalCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Consistent, scope-qualified view of the catalog at one point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Visible items, keyed by name
    pub items: HashMap<String, Item>,
    /// All rules, keyed by name
    pub rules: HashMap<String, Rule>,
    /// child name -> names of its immediate parents
    pub parents_of: HashMap<String, Vec<String>>,
}

impl Snapshot {
    /// Rebuild the triple from the store: visible items, all rules, and the
    /// edges whose endpoints both lie in the visible set, inverted.
    pub async fn build(partitioner: &ScopePartitioner) -> Result<Self> {
        let items = partitioner.visible_items(None).await?;
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();

        let edges = partitioner
            .store()
            .list_edges(EdgeFilter {
                parent_ids: Some(ids.clone()),
                child_ids: Some(ids),
            })
            .await?;
        let parents_of = ChildIndex::build(&items, &edges).invert();

        let rules: HashMap<String, Rule> = partitioner
            .store()
            .list_rules()
            .await?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        // Names are unique across the visible set (shadowed scoped items are
        // already omitted by the partitioner)
        let items: HashMap<String, Item> =
            items.into_iter().map(|i| (i.name.clone(), i)).collect();

        debug!(
            items = items.len(),
            rules = rules.len(),
            scope = partitioner.scope_id(),
            "rebuilt policy snapshot"
        );

        Ok(Self {
            items,
            rules,
            parents_of,
        })
    }

    /// Immediate parents of an item, empty when it has none
    pub fn parents(&self, name: &str) -> &[String] {
        self.parents_of.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Owns the published snapshot and the external cache protocol around it
pub struct SnapshotCache {
    key: String,
    external: Option<Arc<dyn ExternalCache>>,
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new(prefix: &str, scope: &str, external: Option<Arc<dyn ExternalCache>>) -> Self {
        Self {
            key: format!("{}_{}", prefix, scope),
            external,
            current: RwLock::new(None),
        }
    }

    /// The scope-qualified external cache key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the current snapshot, loading it if necessary.
    ///
    /// Resolution order: in-process snapshot, external cache, rebuild from
    /// the store (populating the external cache afterwards). Two concurrent
    /// loads may both rebuild; each publishes a coherent snapshot.
    pub async fn load(&self, partitioner: &ScopePartitioner) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.current.read().await.as_ref() {
            return Ok(snapshot.clone());
        }

        if let Some(external) = &self.external {
            if let Some(bytes) = external.get(&self.key).await? {
                match serde_json::from_slice::<Snapshot>(&bytes) {
                    Ok(snapshot) => {
                        let snapshot = Arc::new(snapshot);
                        *self.current.write().await = Some(snapshot.clone());
                        debug!(key = %self.key, "adopted snapshot from external cache");
                        return Ok(snapshot);
                    }
                    Err(e) => {
                        // Treat a corrupt payload as a miss and rebuild
                        warn!(key = %self.key, error = %e, "discarding unreadable cached snapshot");
                    }
                }
            }
        }

        let snapshot = Arc::new(Snapshot::build(partitioner).await?);
        *self.current.write().await = Some(snapshot.clone());

        if let Some(external) = &self.external {
            let bytes = serde_json::to_vec(snapshot.as_ref())
                .map_err(|e| RbacError::store("failed to encode snapshot", e))?;
            external.set(&self.key, bytes).await?;
        }

        Ok(snapshot)
    }

    /// Drop the published snapshot, in process and externally.
    pub async fn invalidate(&self) -> Result<()> {
        if let Some(external) = &self.external {
            external.delete(&self.key).await?;
        }
        *self.current.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPolicyStore;
    use crate::store::PolicyStore;
    use crate::types::{ChildEdge, ScopeTag};

    async fn seeded_partitioner() -> (InMemoryPolicyStore, ScopePartitioner) {
        let store = InMemoryPolicyStore::new();
        let admin = Item::role("admin");
        let editor = Item::role("editor");
        let hidden = Item::role("hidden").scoped();
        store.save_item(&admin).await.unwrap();
        store.save_item(&editor).await.unwrap();
        store.save_item(&hidden).await.unwrap();
        store
            .save_scope_tag(&ScopeTag::new(hidden.id, "other-tenant"))
            .await
            .unwrap();
        store
            .save_edge(&ChildEdge::new(admin.id, editor.id))
            .await
            .unwrap();
        // Edge into another scope's item must not appear in the triple
        store
            .save_edge(&ChildEdge::new(admin.id, hidden.id))
            .await
            .unwrap();

        let partitioner =
            ScopePartitioner::new("tenant-a".to_string(), Arc::new(store.clone()));
        (store, partitioner)
    }

    #[tokio::test]
    async fn test_build_filters_to_visible_set() {
        let (_store, partitioner) = seeded_partitioner().await;
        let snapshot = Snapshot::build(&partitioner).await.unwrap();

        assert_eq!(snapshot.items.len(), 2);
        assert!(!snapshot.items.contains_key("hidden"));
        assert_eq!(snapshot.parents("editor"), ["admin"]);
        assert!(snapshot.parents("hidden").is_empty());
    }

    #[tokio::test]
    async fn test_load_is_idempotent_and_invalidate_clears() {
        let (store, partitioner) = seeded_partitioner().await;
        let cache = SnapshotCache::new(DEFAULT_CACHE_PREFIX, "tenant-a", None);

        let first = cache.load(&partitioner).await.unwrap();
        // A write after load is invisible until invalidation
        store.save_item(&Item::role("viewer")).await.unwrap();
        let second = cache.load(&partitioner).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!second.items.contains_key("viewer"));

        cache.invalidate().await.unwrap();
        let third = cache.load(&partitioner).await.unwrap();
        assert!(third.items.contains_key("viewer"));
    }

    #[tokio::test]
    async fn test_snapshot_serde_roundtrip() {
        let (_store, partitioner) = seeded_partitioner().await;
        let snapshot = Snapshot::build(&partitioner).await.unwrap();

        let bytes = serde_json::to_vec(&snapshot).unwrap();
        let decoded: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.items.len(), snapshot.items.len());
        assert_eq!(decoded.parents("editor"), snapshot.parents("editor"));
    }

    #[tokio::test]
    async fn test_key_is_scope_qualified() {
        let cache = SnapshotCache::new("rbac", "tenant-a", None);
        assert_eq!(cache.key(), "rbac_tenant-a");
    }
}
