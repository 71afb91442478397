//! PostgreSQL policy store implementation
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE auth_item (
//!     id          UUID PRIMARY KEY,
//!     name        TEXT NOT NULL,
//!     kind        TEXT NOT NULL,
//!     description TEXT,
//!     rule_name   TEXT,
//!     data        JSONB,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE auth_rule (
//!     name       TEXT PRIMARY KEY,
//!     payload    JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE auth_item_child (
//!     parent_id UUID NOT NULL REFERENCES auth_item (id),
//!     child_id  UUID NOT NULL REFERENCES auth_item (id),
//!     PRIMARY KEY (parent_id, child_id)
//! );
//!
//! CREATE TABLE auth_assignment (
//!     item_id    UUID NOT NULL REFERENCES auth_item (id),
//!     user_id    TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (item_id, user_id)
//! );
//!
//! CREATE TABLE auth_scope_tag (
//!     item_id    UUID NOT NULL REFERENCES auth_item (id),
//!     scope_id   TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (item_id, scope_id)
//! );
//! ```
//!
//! Item name uniqueness is enforced by the manager per scope partition, not
//! by the database; the same name may legitimately exist in several scopes.

use crate::error::{RbacError, Result};
use crate::store::{AssignmentFilter, EdgeFilter, ItemSelector, PolicyStore, ScopeTagFilter};
use crate::types::{Assignment, ChildEdge, Item, ItemId, ItemKind, Rule, RulePayload, ScopeTag};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

/// PostgreSQL policy store with connection pooling
pub struct PostgresPolicyStore {
    pool: PgPool,
}

impl PostgresPolicyStore {
    /// Connect with the default pool settings
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .min_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| RbacError::store("Failed to connect to database", e))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for host-side queries and migrations
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const ITEM_COLUMNS: &str =
    "id, name, kind, description, rule_name, data, created_at, updated_at";

fn kind_to_db(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Role => "role",
        ItemKind::Permission => "permission",
    }
}

fn kind_from_db(s: &str) -> Result<ItemKind> {
    match s {
        "role" => Ok(ItemKind::Role),
        "permission" => Ok(ItemKind::Permission),
        other => Err(RbacError::Store(format!("Unknown item kind '{}'", other))),
    }
}

fn item_from_row(row: &PgRow) -> Result<Item> {
    let kind: String = row
        .try_get("kind")
        .map_err(|e| RbacError::store("Failed to read item row", e))?;
    let tagged: bool = row
        .try_get("is_scoped")
        .map_err(|e| RbacError::store("Failed to read item row", e))?;
    Ok(Item {
        id: row
            .try_get("id")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        name: row
            .try_get("name")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        kind: kind_from_db(&kind)?,
        description: row
            .try_get("description")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        rule_name: row
            .try_get("rule_name")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        data: row
            .try_get("data")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| RbacError::store("Failed to read item row", e))?,
        is_scoped: tagged,
    })
}

fn rule_from_row(row: &PgRow) -> Result<Rule> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| RbacError::store("Failed to read rule row", e))?;
    let payload: RulePayload = serde_json::from_value(payload)
        .map_err(|e| RbacError::store("Failed to deserialize rule payload", e))?;
    Ok(Rule {
        name: row
            .try_get("name")
            .map_err(|e| RbacError::store("Failed to read rule row", e))?,
        payload,
        created_at: row
            .try_get("created_at")
            .map_err(|e| RbacError::store("Failed to read rule row", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| RbacError::store("Failed to read rule row", e))?,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment> {
    Ok(Assignment {
        item_id: row
            .try_get("item_id")
            .map_err(|e| RbacError::store("Failed to read assignment row", e))?,
        user_id: row
            .try_get("user_id")
            .map_err(|e| RbacError::store("Failed to read assignment row", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| RbacError::store("Failed to read assignment row", e))?,
    })
}

/// The partition predicate: shared means no scope tags at all, scoped means
/// tagged with that scope id. `$tag` is the bound scope parameter.
fn selector_clause(selector: &ItemSelector<'_>) -> (&'static str, Option<&str>) {
    match selector {
        ItemSelector::Shared => (
            "NOT EXISTS (SELECT 1 FROM auth_scope_tag t WHERE t.item_id = i.id)",
            None,
        ),
        ItemSelector::Scoped(scope) => (
            "EXISTS (SELECT 1 FROM auth_scope_tag t WHERE t.item_id = i.id AND t.scope_id = $tag)",
            Some(scope),
        ),
    }
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    async fn find_item(&self, name: &str, selector: ItemSelector<'_>) -> Result<Option<Item>> {
        let (clause, scope) = selector_clause(&selector);
        let sql = format!(
            "SELECT {cols}, $2::TEXT IS NOT NULL AS is_scoped \
             FROM auth_item i WHERE i.name = $1 AND {clause}",
            cols = ITEM_COLUMNS,
            clause = clause.replace("$tag", "$2"),
        );

        let row = sqlx::query(&sql)
            .bind(name)
            .bind(scope)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RbacError::store("Failed to find item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_items(
        &self,
        kind: Option<ItemKind>,
        selector: ItemSelector<'_>,
    ) -> Result<Vec<Item>> {
        let (clause, scope) = selector_clause(&selector);
        let sql = format!(
            "SELECT {cols}, $2::TEXT IS NOT NULL AS is_scoped \
             FROM auth_item i WHERE ($1::TEXT IS NULL OR i.kind = $1) AND {clause} \
             ORDER BY i.name",
            cols = ITEM_COLUMNS,
            clause = clause.replace("$tag", "$2"),
        );

        let rows = sqlx::query(&sql)
            .bind(kind.map(kind_to_db))
            .bind(scope)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RbacError::store("Failed to list items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    async fn save_item(&self, item: &Item) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auth_item (id, name, kind, description, rule_name, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                description = EXCLUDED.description,
                rule_name = EXCLUDED.rule_name,
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.name)
        .bind(kind_to_db(item.kind))
        .bind(&item.description)
        .bind(&item.rule_name)
        .bind(&item.data)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to save item", e))?;
        Ok(())
    }

    async fn delete_item(&self, id: ItemId) -> Result<()> {
        sqlx::query("DELETE FROM auth_item WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RbacError::store("Failed to delete item", e))?;
        Ok(())
    }

    async fn retarget_rule(&self, old_name: &str, new_name: Option<&str>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE auth_item SET rule_name = $2, updated_at = $3 WHERE rule_name = $1",
        )
        .bind(old_name)
        .bind(new_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to retarget rule", e))?;
        Ok(result.rows_affected())
    }

    async fn find_rule(&self, name: &str) -> Result<Option<Rule>> {
        let row = sqlx::query(
            "SELECT name, payload, created_at, updated_at FROM auth_rule WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to find rule", e))?;

        row.as_ref().map(rule_from_row).transpose()
    }

    async fn list_rules(&self) -> Result<Vec<Rule>> {
        let rows = sqlx::query(
            "SELECT name, payload, created_at, updated_at FROM auth_rule ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to list rules", e))?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn save_rule(&self, rule: &Rule) -> Result<()> {
        let payload = serde_json::to_value(&rule.payload)
            .map_err(|e| RbacError::store("Failed to serialize rule payload", e))?;

        sqlx::query(
            r#"
            INSERT INTO auth_rule (name, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name)
            DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&rule.name)
        .bind(&payload)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to save rule", e))?;
        Ok(())
    }

    async fn delete_rule(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM auth_rule WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| RbacError::store("Failed to delete rule", e))?;
        Ok(())
    }

    async fn list_edges(&self, filter: EdgeFilter) -> Result<Vec<ChildEdge>> {
        let rows = sqlx::query(
            "SELECT parent_id, child_id FROM auth_item_child \
             WHERE ($1::UUID[] IS NULL OR parent_id = ANY($1)) \
               AND ($2::UUID[] IS NULL OR child_id = ANY($2))",
        )
        .bind(&filter.parent_ids)
        .bind(&filter.child_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to list edges", e))?;

        rows.iter()
            .map(|row| {
                Ok(ChildEdge {
                    parent_id: row
                        .try_get("parent_id")
                        .map_err(|e| RbacError::store("Failed to read edge row", e))?,
                    child_id: row
                        .try_get("child_id")
                        .map_err(|e| RbacError::store("Failed to read edge row", e))?,
                })
            })
            .collect()
    }

    async fn save_edge(&self, edge: &ChildEdge) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_item_child (parent_id, child_id) VALUES ($1, $2) \
             ON CONFLICT (parent_id, child_id) DO NOTHING",
        )
        .bind(edge.parent_id)
        .bind(edge.child_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to save edge", e))?;
        Ok(())
    }

    async fn delete_edges(&self, filter: EdgeFilter) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM auth_item_child \
             WHERE ($1::UUID[] IS NULL OR parent_id = ANY($1)) \
               AND ($2::UUID[] IS NULL OR child_id = ANY($2))",
        )
        .bind(&filter.parent_ids)
        .bind(&filter.child_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to delete edges", e))?;
        Ok(result.rows_affected())
    }

    async fn find_assignment(&self, item_id: ItemId, user_id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query(
            "SELECT item_id, user_id, created_at FROM auth_assignment \
             WHERE item_id = $1 AND user_id = $2",
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to find assignment", e))?;

        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn list_assignments(
        &self,
        user_id: &str,
        item_ids: Option<&[ItemId]>,
    ) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT item_id, user_id, created_at FROM auth_assignment \
             WHERE user_id = $1 AND ($2::UUID[] IS NULL OR item_id = ANY($2))",
        )
        .bind(user_id)
        .bind(item_ids.map(|ids| ids.to_vec()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to list assignments", e))?;

        rows.iter().map(assignment_from_row).collect()
    }

    async fn list_assignments_for_item(&self, item_id: ItemId) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(
            "SELECT item_id, user_id, created_at FROM auth_assignment WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to list assignments for item", e))?;

        rows.iter().map(assignment_from_row).collect()
    }

    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_assignment (item_id, user_id, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (item_id, user_id) DO NOTHING",
        )
        .bind(assignment.item_id)
        .bind(&assignment.user_id)
        .bind(assignment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to save assignment", e))?;
        Ok(())
    }

    async fn delete_assignments(&self, filter: AssignmentFilter) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM auth_assignment \
             WHERE ($1::TEXT IS NULL OR user_id = $1) \
               AND ($2::UUID[] IS NULL OR item_id = ANY($2))",
        )
        .bind(&filter.user_id)
        .bind(&filter.item_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to delete assignments", e))?;
        Ok(result.rows_affected())
    }

    async fn list_scope_tags(
        &self,
        scope_id: &str,
        item_ids: Option<&[ItemId]>,
    ) -> Result<Vec<ScopeTag>> {
        let rows = sqlx::query(
            "SELECT item_id, scope_id, created_at FROM auth_scope_tag \
             WHERE scope_id = $1 AND ($2::UUID[] IS NULL OR item_id = ANY($2))",
        )
        .bind(scope_id)
        .bind(item_ids.map(|ids| ids.to_vec()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to list scope tags", e))?;

        rows.iter()
            .map(|row| {
                Ok(ScopeTag {
                    item_id: row
                        .try_get("item_id")
                        .map_err(|e| RbacError::store("Failed to read scope tag row", e))?,
                    scope_id: row
                        .try_get("scope_id")
                        .map_err(|e| RbacError::store("Failed to read scope tag row", e))?,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| RbacError::store("Failed to read scope tag row", e))?,
                })
            })
            .collect()
    }

    async fn save_scope_tag(&self, tag: &ScopeTag) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_scope_tag (item_id, scope_id, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (item_id, scope_id) DO NOTHING",
        )
        .bind(tag.item_id)
        .bind(&tag.scope_id)
        .bind(tag.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to save scope tag", e))?;
        Ok(())
    }

    async fn delete_scope_tags(&self, filter: ScopeTagFilter) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM auth_scope_tag \
             WHERE ($1::TEXT IS NULL OR scope_id = $1) \
               AND ($2::UUID[] IS NULL OR item_id = ANY($2))",
        )
        .bind(&filter.scope_id)
        .bind(&filter.item_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| RbacError::store("Failed to delete scope tags", e))?;
        Ok(result.rows_affected())
    }
}
