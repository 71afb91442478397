//! Bounded per-user memoization of direct assignments

use crate::types::Assignment;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of users memoized at once
pub const DEFAULT_ASSIGNMENT_CAPACITY: usize = 1024;

/// A user's direct assignments, keyed by item name
pub type UserAssignments = Arc<HashMap<String, Assignment>>;

/// Memoizes each user's direct-assignment set for the lifetime of the
/// manager instance, until invalidated. Bounded LRU so a long-lived manager
/// serving many users cannot grow without limit.
pub struct AssignmentCache {
    entries: Mutex<LruCache<String, UserAssignments>>,
}

impl AssignmentCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, UserAssignments>> {
        // A panic while holding the lock leaves plain data; keep serving it.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, user_id: &str) -> Option<UserAssignments> {
        self.lock().get(user_id).cloned()
    }

    pub fn insert(&self, user_id: &str, assignments: UserAssignments) {
        self.lock().put(user_id.to_string(), assignments);
    }

    /// Drop one user's entry (assign/revoke/revoke_all)
    pub fn invalidate_user(&self, user_id: &str) {
        self.lock().pop(user_id);
    }

    /// Drop everything (bulk mutations, snapshot invalidation)
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AssignmentCache {
    fn default() -> Self {
        // DEFAULT_ASSIGNMENT_CAPACITY is non-zero
        Self::new(NonZeroUsize::new(DEFAULT_ASSIGNMENT_CAPACITY).unwrap())
    }
}
