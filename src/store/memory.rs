//! In-memory policy store implementation

use super::{AssignmentFilter, EdgeFilter, ItemSelector, PolicyStore, ScopeTagFilter};
use crate::error::Result;
use crate::types::{Assignment, ChildEdge, Item, ItemId, ItemKind, Rule, ScopeTag};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    items: HashMap<ItemId, Item>,
    rules: HashMap<String, Rule>,
    edges: HashSet<ChildEdge>,
    assignments: HashMap<(ItemId, String), Assignment>,
    scope_tags: HashMap<(ItemId, String), ScopeTag>,
}

impl State {
    fn tagged_scopes(&self, item_id: ItemId) -> impl Iterator<Item = &str> {
        self.scope_tags
            .values()
            .filter(move |t| t.item_id == item_id)
            .map(|t| t.scope_id.as_str())
    }

    fn selected(&self, item: &Item, selector: ItemSelector<'_>) -> bool {
        match selector {
            ItemSelector::Shared => self.tagged_scopes(item.id).next().is_none(),
            ItemSelector::Scoped(scope) => self.tagged_scopes(item.id).any(|s| s == scope),
        }
    }
}

/// Keeps the whole catalog in process; the default backend for tests and
/// single-process deployments. Shared freely: clones reference one state.
#[derive(Clone, Default)]
pub struct InMemoryPolicyStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn find_item(&self, name: &str, selector: ItemSelector<'_>) -> Result<Option<Item>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .find(|item| item.name == name && state.selected(item, selector))
            .cloned())
    }

    async fn list_items(
        &self,
        kind: Option<ItemKind>,
        selector: ItemSelector<'_>,
    ) -> Result<Vec<Item>> {
        let state = self.state.read().await;
        Ok(state
            .items
            .values()
            .filter(|item| kind.map_or(true, |k| item.kind == k))
            .filter(|item| state.selected(item, selector))
            .cloned()
            .collect())
    }

    async fn save_item(&self, item: &Item) -> Result<()> {
        let mut state = self.state.write().await;
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_item(&self, id: ItemId) -> Result<()> {
        let mut state = self.state.write().await;
        state.items.remove(&id);
        Ok(())
    }

    async fn retarget_rule(&self, old: &str, new: Option<&str>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut touched = 0;
        for item in state.items.values_mut() {
            if item.rule_name.as_deref() == Some(old) {
                item.rule_name = new.map(str::to_string);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn find_rule(&self, name: &str) -> Result<Option<Rule>> {
        let state = self.state.read().await;
        Ok(state.rules.get(name).cloned())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let state = self.state.read().await;
        Ok(state.rules.values().cloned().collect())
    }

    async fn save_rule(&self, rule: &Rule) -> Result<()> {
        let mut state = self.state.write().await;
        state.rules.insert(rule.name.clone(), rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.rules.remove(name);
        Ok(())
    }

    async fn list_edges(&self, filter: EdgeFilter) -> Result<Vec<ChildEdge>> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .iter()
            .filter(|e| filter.matches(e))
            .copied()
            .collect())
    }

    async fn save_edge(&self, edge: &ChildEdge) -> Result<()> {
        let mut state = self.state.write().await;
        state.edges.insert(*edge);
        Ok(())
    }

    async fn delete_edges(&self, filter: EdgeFilter) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.edges.len();
        state.edges.retain(|e| !filter.matches(e));
        Ok((before - state.edges.len()) as u64)
    }

    async fn find_assignment(
        &self,
        item_id: ItemId,
        user_id: &str,
    ) -> Result<Option<Assignment>> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .get(&(item_id, user_id.to_string()))
            .cloned())
    }

    async fn list_assignments(
        &self,
        user_id: &str,
        item_ids: Option<&[ItemId]>,
    ) -> Result<Vec<Assignment>> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .values()
            .filter(|a| a.user_id == user_id)
            .filter(|a| item_ids.map_or(true, |ids| ids.contains(&a.item_id)))
            .cloned()
            .collect())
    }

    async fn list_assignments_for_item(&self, item_id: ItemId) -> Result<Vec<Assignment>> {
        let state = self.state.read().await;
        Ok(state
            .assignments
            .values()
            .filter(|a| a.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (assignment.item_id, assignment.user_id.clone());
        state.assignments.entry(key).or_insert_with(|| assignment.clone());
        Ok(())
    }

    async fn delete_assignments(&self, filter: AssignmentFilter) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.assignments.len();
        state.assignments.retain(|_, a| !filter.matches(a));
        Ok((before - state.assignments.len()) as u64)
    }

    async fn list_scope_tags(
        &self,
        scope_id: &str,
        item_ids: Option<&[ItemId]>,
    ) -> Result<Vec<ScopeTag>> {
        let state = self.state.read().await;
        Ok(state
            .scope_tags
            .values()
            .filter(|t| t.scope_id == scope_id)
            .filter(|t| item_ids.map_or(true, |ids| ids.contains(&t.item_id)))
            .cloned()
            .collect())
    }

    async fn save_scope_tag(&self, tag: &ScopeTag) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (tag.item_id, tag.scope_id.clone());
        state.scope_tags.entry(key).or_insert_with(|| tag.clone());
        Ok(())
    }

    async fn delete_scope_tags(&self, filter: ScopeTagFilter) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.scope_tags.len();
        state.scope_tags.retain(|_, t| !filter.matches(t));
        Ok((before - state.scope_tags.len()) as u64)
    }
}
