//! Child index and transitive-closure traversal over the item DAG
//!
//! The hierarchy is a DAG, not a tree: a descendant reached via multiple
//! paths is expected and must be collected exactly once. Traversal is an
//! explicit worklist with a visited set, so iteration order and termination
//! do not depend on call-stack recursion.

use crate::types::{ChildEdge, Item, ItemId};
use std::collections::{HashMap, HashSet, VecDeque};

/// Name-keyed child adjacency built from the edges whose endpoints are both
/// visible in the active scope.
#[derive(Debug, Clone, Default)]
pub struct ChildIndex {
    children: HashMap<String, Vec<String>>,
}

impl ChildIndex {
    /// Build the index from visible items and the edge set. Edges touching
    /// an item outside `items` are skipped.
    pub fn build(items: &[Item], edges: &[ChildEdge]) -> Self {
        let by_id: HashMap<ItemId, &str> =
            items.iter().map(|i| (i.id, i.name.as_str())).collect();

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for edge in edges {
            if let (Some(parent), Some(child)) = (by_id.get(&edge.parent_id), by_id.get(&edge.child_id)) {
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(child.to_string());
            }
        }
        Self { children }
    }

    /// Immediate children of `name`
    pub fn children_of(&self, name: &str) -> &[String] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every reachable descendant of `name`, each exactly once.
    pub fn descendants(&self, name: &str) -> HashSet<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut worklist: VecDeque<&str> = VecDeque::new();
        worklist.push_back(name);

        while let Some(current) = worklist.pop_front() {
            for child in self.children_of(current) {
                if visited.insert(child.clone()) {
                    worklist.push_back(child);
                }
            }
        }
        visited
    }

    /// Whether adding an edge `parent -> child` would close a cycle: true if
    /// `parent` is already reachable from `child` (or the edge is a self-loop).
    pub fn would_cycle(&self, parent: &str, child: &str) -> bool {
        if parent == child {
            return true;
        }
        self.descendants(child).contains(parent)
    }

    /// Invert into the parent index a snapshot carries for upward walks
    pub fn invert(&self) -> HashMap<String, Vec<String>> {
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();
        for (parent, children) in &self.children {
            for child in children {
                parents.entry(child.clone()).or_default().push(parent.clone());
            }
        }
        parents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Item;

    fn index(items: &[Item], pairs: &[(&str, &str)]) -> ChildIndex {
        let by_name: HashMap<&str, ItemId> =
            items.iter().map(|i| (i.name.as_str(), i.id)).collect();
        let edges: Vec<ChildEdge> = pairs
            .iter()
            .map(|(p, c)| ChildEdge::new(by_name[p], by_name[c]))
            .collect();
        ChildIndex::build(items, &edges)
    }

    fn items(names: &[&str]) -> Vec<Item> {
        names.iter().map(|n| Item::role(*n)).collect()
    }

    #[test]
    fn test_descendants_linear_chain() {
        let items = items(&["admin", "editor", "viewer"]);
        let idx = index(&items, &[("admin", "editor"), ("editor", "viewer")]);

        let descendants = idx.descendants("admin");
        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains("editor"));
        assert!(descendants.contains("viewer"));
        assert!(idx.descendants("viewer").is_empty());
    }

    #[test]
    fn test_diamond_converges_once() {
        // A -> B, A -> C, B -> D, C -> D
        let items = items(&["a", "b", "c", "d"]);
        let idx = index(&items, &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);

        let descendants = idx.descendants("a");
        assert_eq!(descendants.len(), 3);
        assert!(descendants.contains("d"));
    }

    #[test]
    fn test_would_cycle() {
        let items = items(&["admin", "editor", "viewer"]);
        let idx = index(&items, &[("admin", "editor"), ("editor", "viewer")]);

        // Self-loop
        assert!(idx.would_cycle("admin", "admin"));
        // Back edge to an ancestor closes a cycle
        assert!(idx.would_cycle("viewer", "admin"));
        assert!(idx.would_cycle("editor", "admin"));
        // Shortcut edge over an existing path is fine
        assert!(!idx.would_cycle("admin", "viewer"));
    }

    #[test]
    fn test_edges_outside_item_set_are_skipped() {
        let visible = items(&["admin", "editor"]);
        let foreign = Item::role("other-tenant-role");
        let edges = vec![
            ChildEdge::new(visible[0].id, visible[1].id),
            ChildEdge::new(visible[0].id, foreign.id),
        ];
        let idx = ChildIndex::build(&visible, &edges);

        assert_eq!(idx.children_of("admin"), ["editor"]);
    }

    #[test]
    fn test_invert() {
        let items = items(&["admin", "editor", "viewer"]);
        let idx = index(&items, &[("admin", "viewer"), ("editor", "viewer")]);

        let parents = idx.invert();
        let mut viewer_parents = parents["viewer"].clone();
        viewer_parents.sort();
        assert_eq!(viewer_parents, ["admin", "editor"]);
        assert!(!parents.contains_key("admin"));
    }
}
