//! Snippet persistence behind the `SnippetStore` seam.
//!
//! `PgStore` keeps each partition in its own table (`snippets`,
//! `ms_snippets`) plus a shared `snippet_options` key/value table.
//! `MemoryStore` holds the same data in process for embedding and tests.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;

use crate::db;
use crate::errors::AppError;
use crate::models::scope::Scope;
use crate::models::snippet::{FieldUpdate, Partition, Snippet, SnippetRow};

/// Row selection for `SnippetStore::list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub scopes: Option<Vec<Scope>>,
    pub active: Option<bool>,
}

impl ListFilter {
    pub fn scopes(scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            scopes: Some(scopes.into_iter().collect()),
            active: None,
        }
    }

    fn matches(&self, snippet: &Snippet) -> bool {
        let scope_ok = self
            .scopes
            .as_ref()
            .map_or(true, |scopes| scopes.contains(&snippet.scope));
        let active_ok = self.active.map_or(true, |active| snippet.active == active);
        scope_ok && active_ok
    }
}

/// Persistent storage for snippet records and per-partition options.
///
/// Listing a partition whose backing storage does not exist yields an empty
/// list rather than an error.
pub trait SnippetStore: Send + Sync {
    fn list(
        &self,
        partition: Partition,
        filter: &ListFilter,
    ) -> impl Future<Output = Result<Vec<Snippet>, AppError>> + Send;

    fn get(
        &self,
        id: i64,
        partition: Partition,
    ) -> impl Future<Output = Result<Option<Snippet>, AppError>> + Send;

    /// Insert (id 0) or update a snippet, returning its id.
    fn save(&self, snippet: &Snippet) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Update selected columns by id. Returns false if no row matched.
    fn update_fields(
        &self,
        id: i64,
        partition: Partition,
        fields: &FieldUpdate,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Returns false if no row matched.
    fn delete(
        &self,
        id: i64,
        partition: Partition,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn get_option(
        &self,
        partition: Partition,
        name: &str,
    ) -> impl Future<Output = Result<Option<Value>, AppError>> + Send;

    fn set_option(
        &self,
        partition: Partition,
        name: &str,
        value: &Value,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Read-modify-write an option. Concurrent updates of the same option
    /// are serialized, so none is lost. Returns the stored value.
    fn update_option<F>(
        &self,
        partition: Partition,
        name: &str,
        update: F,
    ) -> impl Future<Output = Result<Value, AppError>> + Send
    where
        F: FnOnce(Option<Value>) -> Result<Value, AppError> + Send;
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SnippetStore for PgStore {
    async fn list(
        &self,
        partition: Partition,
        filter: &ListFilter,
    ) -> Result<Vec<Snippet>, AppError> {
        let scopes: Option<Vec<String>> = filter
            .scopes
            .as_ref()
            .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect());

        let sql = format!(
            "SELECT * FROM {} \
             WHERE ($1::text[] IS NULL OR scope = ANY($1)) \
               AND ($2::boolean IS NULL OR active = $2) \
             ORDER BY priority, id",
            partition.table()
        );

        let rows = sqlx::query_as::<_, SnippetRow>(&sql)
            .bind(scopes)
            .bind(filter.active)
            .fetch_all(&self.pool)
            .await;

        match rows {
            Ok(rows) => Ok(rows.into_iter().map(|r| r.into_snippet(partition)).collect()),
            Err(e) if db::is_missing_table(&e) => {
                tracing::debug!(table = partition.table(), "Snippet table missing, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn get(&self, id: i64, partition: Partition) -> Result<Option<Snippet>, AppError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", partition.table());
        let row = sqlx::query_as::<_, SnippetRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match row {
            Ok(row) => Ok(row.map(|r| r.into_snippet(partition))),
            Err(e) if db::is_missing_table(&e) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn save(&self, snippet: &Snippet) -> Result<i64, AppError> {
        let table = snippet.partition().table();

        if snippet.is_new() {
            let sql = format!(
                "INSERT INTO {table} (name, description, code, tags, scope, priority, active) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id"
            );
            let id = sqlx::query_scalar::<_, i64>(&sql)
                .bind(&snippet.name)
                .bind(&snippet.description)
                .bind(&snippet.code)
                .bind(&snippet.tags)
                .bind(snippet.scope.as_str())
                .bind(snippet.priority)
                .bind(snippet.active)
                .fetch_one(&self.pool)
                .await?;
            return Ok(id);
        }

        let sql = format!(
            "UPDATE {table} SET name = $1, description = $2, code = $3, tags = $4, \
             scope = $5, priority = $6, active = $7, updated_at = NOW() \
             WHERE id = $8 RETURNING id"
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(&snippet.name)
            .bind(&snippet.description)
            .bind(&snippet.code)
            .bind(&snippet.tags)
            .bind(snippet.scope.as_str())
            .bind(snippet.priority)
            .bind(snippet.active)
            .bind(snippet.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Snippet {} not found", snippet.id)))
    }

    async fn update_fields(
        &self,
        id: i64,
        partition: Partition,
        fields: &FieldUpdate,
    ) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET active = COALESCE($1, active), priority = COALESCE($2, priority), \
             updated_at = NOW() WHERE id = $3",
            partition.table()
        );
        let result = sqlx::query(&sql)
            .bind(fields.active)
            .bind(fields.priority)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64, partition: Partition) -> Result<bool, AppError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", partition.table());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_option(&self, partition: Partition, name: &str) -> Result<Option<Value>, AppError> {
        let value = sqlx::query_scalar::<_, Value>(
            "SELECT value FROM snippet_options WHERE partition = $1 AND name = $2",
        )
        .bind(partition.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await;

        match value {
            Ok(value) => Ok(value),
            Err(e) if db::is_missing_table(&e) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn set_option(&self, partition: Partition, name: &str, value: &Value) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO snippet_options (partition, name, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (partition, name)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(partition.as_str())
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_option<F>(&self, partition: Partition, name: &str, update: F) -> Result<Value, AppError>
    where
        F: FnOnce(Option<Value>) -> Result<Value, AppError> + Send,
    {
        let mut tx = self.pool.begin().await?;

        // A placeholder row gives first-time writers a row to lock.
        sqlx::query(
            "INSERT INTO snippet_options (partition, name, value) VALUES ($1, $2, 'null'::jsonb) \
             ON CONFLICT (partition, name) DO NOTHING",
        )
        .bind(partition.as_str())
        .bind(name)
        .execute(&mut *tx)
        .await?;

        let current = sqlx::query_scalar::<_, Value>(
            "SELECT value FROM snippet_options WHERE partition = $1 AND name = $2 FOR UPDATE",
        )
        .bind(partition.as_str())
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        let value = update(Some(current).filter(|v| !v.is_null()))?;

        sqlx::query(
            "UPDATE snippet_options SET value = $3, updated_at = NOW() WHERE partition = $1 AND name = $2",
        )
        .bind(partition.as_str())
        .bind(name)
        .bind(&value)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(value)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    site: BTreeMap<i64, Snippet>,
    network: BTreeMap<i64, Snippet>,
    next_id: i64,
    options: HashMap<(Partition, String), Value>,
}

impl MemoryState {
    fn table(&mut self, partition: Partition) -> &mut BTreeMap<i64, Snippet> {
        match partition {
            Partition::Site => &mut self.site,
            Partition::Network => &mut self.network,
        }
    }
}

/// In-process store with the same semantics as `PgStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }
}

impl SnippetStore for MemoryStore {
    async fn list(
        &self,
        partition: Partition,
        filter: &ListFilter,
    ) -> Result<Vec<Snippet>, AppError> {
        let mut state = self.state()?;
        let mut snippets: Vec<Snippet> = state
            .table(partition)
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        snippets.sort_by_key(|s| (s.priority, s.id));
        Ok(snippets)
    }

    async fn get(&self, id: i64, partition: Partition) -> Result<Option<Snippet>, AppError> {
        let mut state = self.state()?;
        Ok(state.table(partition).get(&id).cloned())
    }

    async fn save(&self, snippet: &Snippet) -> Result<i64, AppError> {
        let mut state = self.state()?;
        let now = Utc::now();
        let mut record = snippet.clone();
        record.shared_network = false;

        if record.is_new() {
            state.next_id += 1;
            record.id = state.next_id;
            record.created = Some(now);
            record.modified = Some(now);
            let id = record.id;
            state.table(snippet.partition()).insert(id, record);
            return Ok(id);
        }

        let table = state.table(snippet.partition());
        let existing = table
            .get(&record.id)
            .ok_or_else(|| AppError::NotFound(format!("Snippet {} not found", record.id)))?;
        record.created = existing.created;
        record.modified = Some(now);
        let id = record.id;
        table.insert(id, record);
        Ok(id)
    }

    async fn update_fields(
        &self,
        id: i64,
        partition: Partition,
        fields: &FieldUpdate,
    ) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.table(partition).get_mut(&id) {
            Some(snippet) => {
                if let Some(active) = fields.active {
                    snippet.active = active;
                }
                if let Some(priority) = fields.priority {
                    snippet.priority = priority.max(0);
                }
                snippet.modified = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64, partition: Partition) -> Result<bool, AppError> {
        let mut state = self.state()?;
        Ok(state.table(partition).remove(&id).is_some())
    }

    async fn get_option(&self, partition: Partition, name: &str) -> Result<Option<Value>, AppError> {
        let state = self.state()?;
        Ok(state.options.get(&(partition, name.to_string())).cloned())
    }

    async fn set_option(&self, partition: Partition, name: &str, value: &Value) -> Result<(), AppError> {
        let mut state = self.state()?;
        state
            .options
            .insert((partition, name.to_string()), value.clone());
        Ok(())
    }

    async fn update_option<F>(&self, partition: Partition, name: &str, update: F) -> Result<Value, AppError>
    where
        F: FnOnce(Option<Value>) -> Result<Value, AppError> + Send,
    {
        let mut state = self.state()?;
        let key = (partition, name.to_string());
        let value = update(state.options.get(&key).cloned())?;
        state.options.insert(key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snippet(partition: Partition, scope: Scope, priority: i32, active: bool) -> Snippet {
        let mut s = Snippet::new(partition);
        s.scope = scope;
        s.priority = priority;
        s.active = active;
        s
    }

    #[tokio::test]
    async fn memory_store_assigns_ids_and_timestamps() {
        let store = MemoryStore::new();
        let id = store
            .save(&snippet(Partition::Site, Scope::Global, 10, true))
            .await
            .unwrap();
        assert_eq!(id, 1);
        let saved = store.get(id, Partition::Site).await.unwrap().unwrap();
        assert!(saved.created.is_some());
        assert!(store.get(id, Partition::Network).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_update_of_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let mut s = snippet(Partition::Site, Scope::Global, 10, true);
        s.id = 42;
        let err = store.save(&s).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn memory_store_filters_and_orders() {
        let store = MemoryStore::new();
        store.save(&snippet(Partition::Site, Scope::SiteCss, 20, true)).await.unwrap();
        store.save(&snippet(Partition::Site, Scope::SiteCss, 5, false)).await.unwrap();
        store.save(&snippet(Partition::Site, Scope::Admin, 1, true)).await.unwrap();

        let filter = ListFilter {
            scopes: Some(vec![Scope::SiteCss]),
            active: Some(true),
        };
        let listed = store.list(Partition::Site, &filter).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].priority, 20);

        let all = store.list(Partition::Site, &ListFilter::default()).await.unwrap();
        let priorities: Vec<i32> = all.iter().map(|s| s.priority).collect();
        assert_eq!(priorities, vec![1, 5, 20]);
    }

    #[tokio::test]
    async fn memory_store_update_fields_and_delete() {
        let store = MemoryStore::new();
        let id = store
            .save(&snippet(Partition::Network, Scope::SingleUse, 10, true))
            .await
            .unwrap();
        let update = FieldUpdate {
            active: Some(false),
            priority: None,
        };
        assert!(store.update_fields(id, Partition::Network, &update).await.unwrap());
        assert!(!store.get(id, Partition::Network).await.unwrap().unwrap().active);
        assert!(!store.update_fields(id, Partition::Site, &update).await.unwrap());
        assert!(store.delete(id, Partition::Network).await.unwrap());
        assert!(!store.delete(id, Partition::Network).await.unwrap());
    }

    #[tokio::test]
    async fn memory_store_options_are_partitioned() {
        let store = MemoryStore::new();
        store
            .set_option(Partition::Network, "shared_network_snippets", &json!([1, 2]))
            .await
            .unwrap();
        assert!(store
            .get_option(Partition::Site, "shared_network_snippets")
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .get_option(Partition::Network, "shared_network_snippets")
                .await
                .unwrap(),
            Some(json!([1, 2]))
        );
    }

    #[tokio::test]
    async fn memory_store_update_option_sees_previous_value() {
        let store = MemoryStore::new();
        let first = store
            .update_option(Partition::Site, "counter", |current| {
                assert!(current.is_none());
                Ok(json!(1))
            })
            .await
            .unwrap();
        assert_eq!(first, json!(1));

        let second = store
            .update_option(Partition::Site, "counter", |current| {
                Ok(json!(current.and_then(|v| v.as_i64()).unwrap_or(0) + 1))
            })
            .await
            .unwrap();
        assert_eq!(second, json!(2));
        assert_eq!(
            store.get_option(Partition::Site, "counter").await.unwrap(),
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn memory_store_failed_update_keeps_option() {
        let store = MemoryStore::new();
        store.set_option(Partition::Site, "counter", &json!(5)).await.unwrap();
        let result = store
            .update_option(Partition::Site, "counter", |_| {
                Err(AppError::Internal("nope".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(
            store.get_option(Partition::Site, "counter").await.unwrap(),
            Some(json!(5))
        );
    }
}
