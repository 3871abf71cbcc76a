use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use tokio::task;

use super::{BATCH_SIZE, Page, PageKey, ScanFilter, SnapshotStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{EntityRecord, ObjectType};

const SCHEMA: &str = include_str!("schema.sql");

/// Shared SQLite handle. rusqlite is blocking, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        // with WAL, worst case is losing the last batch
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut *guard)
        })
        .await?
    }
}

/// Which record table a store writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Live cycles, one row per `(objectID, timestamp)`.
    Transient,
    /// Reference data, one row per `objectID`.
    Permanent,
}

impl Table {
    fn name(&self) -> &'static str {
        match self {
            Table::Transient => "transient_data",
            Table::Permanent => "permanent_data",
        }
    }

    /// Cycle rows are never updated in place; a repeated key is an error.
    fn insert_verb(&self) -> &'static str {
        match self {
            Table::Transient => "INSERT",
            Table::Permanent => "INSERT OR REPLACE",
        }
    }
}

pub struct SqliteSnapshotStore {
    db: Database,
    table: Table,
    page_size: usize,
}

impl SqliteSnapshotStore {
    pub fn new(db: Database, table: Table, page_size: usize) -> Self {
        Self {
            db,
            table,
            page_size: page_size.max(1),
        }
    }

    /// Builds the `WHERE ... ORDER BY ... LIMIT` tail shared by both scan kinds.
    fn scan_tail(
        &self,
        filter: &ScanFilter,
        start: Option<PageKey>,
        require_timestamp: bool,
    ) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut values = Vec::new();

        if let Some(PageKey(key)) = start {
            conditions.push("record_key > ?".to_string());
            values.push(Value::Text(key));
        }
        if !filter.object_types.is_empty() {
            let marks = vec!["?"; filter.object_types.len()].join(", ");
            conditions.push(format!("object_type IN ({marks})"));
            values.extend(
                filter
                    .object_types
                    .iter()
                    .map(|t| Value::Text(t.as_str().to_string())),
            );
        }
        if let Some(ts) = filter.timestamp {
            conditions.push("timestamp = ?".to_string());
            values.push(Value::Integer(ts));
        }
        if require_timestamp {
            conditions.push("timestamp IS NOT NULL".to_string());
        }

        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        // one extra row tells us whether another page exists
        values.push(Value::Integer(self.page_size as i64 + 1));
        (format!("{where_sql} ORDER BY record_key LIMIT ?"), values)
    }
}

fn into_page<T>(mut rows: Vec<(String, T)>, page_size: usize) -> Page<T> {
    let last_evaluated_key = if rows.len() > page_size {
        rows.truncate(page_size);
        rows.last().map(|(key, _)| PageKey(key.clone()))
    } else {
        None
    };
    Page {
        items: rows.into_iter().map(|(_, item)| item).collect(),
        last_evaluated_key,
    }
}

fn decode(body: &str) -> StoreResult<EntityRecord> {
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    #[tracing::instrument(skip(self, records), fields(table = self.table.name(), count = records.len()))]
    async fn append(&self, records: &[EntityRecord]) -> StoreResult<usize> {
        let rows = records
            .iter()
            .map(|r| {
                Ok((
                    r.record_key(),
                    r.object_id.clone(),
                    r.object_type().as_str(),
                    r.timestamp,
                    serde_json::to_string(r)?,
                ))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let sql = format!(
            "{} INTO {} (record_key, object_id, object_type, timestamp, body) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table.insert_verb(),
            self.table.name()
        );

        let written = self
            .db
            .call(move |conn| {
                let mut written = 0;
                for batch in rows.chunks(BATCH_SIZE) {
                    let tx = conn.transaction()?;
                    {
                        let mut stmt = tx.prepare_cached(&sql)?;
                        for (key, object_id, object_type, timestamp, body) in batch {
                            stmt.execute(params![key, object_id, object_type, timestamp, body])?;
                        }
                    }
                    tx.commit()?;
                    written += batch.len();
                }
                Ok(written)
            })
            .await?;

        tracing::debug!(written, "Append complete");
        Ok(written)
    }

    async fn scan_page(
        &self,
        filter: &ScanFilter,
        start: Option<PageKey>,
    ) -> StoreResult<Page<EntityRecord>> {
        let (tail, values) = self.scan_tail(filter, start, false);
        let sql = format!("SELECT record_key, body FROM {}{tail}", self.table.name());
        let page_size = self.page_size;

        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                let rows = rows
                    .into_iter()
                    .map(|(key, body)| Ok((key, decode(&body)?)))
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(into_page(rows, page_size))
            })
            .await
    }

    async fn scan_timestamps_page(
        &self,
        filter: &ScanFilter,
        start: Option<PageKey>,
    ) -> StoreResult<Page<i64>> {
        let (tail, values) = self.scan_tail(filter, start, true);
        let sql = format!("SELECT record_key, timestamp FROM {}{tail}", self.table.name());
        let page_size = self.page_size;

        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(values), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(into_page(rows, page_size))
            })
            .await
    }

    async fn query_by_type(&self, object_type: ObjectType) -> StoreResult<Vec<EntityRecord>> {
        let sql = format!(
            "SELECT body FROM {} WHERE object_type = ?1 ORDER BY record_key",
            self.table.name()
        );

        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                let bodies = stmt
                    .query_map([object_type.as_str()], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                bodies.iter().map(|body| decode(body)).collect()
            })
            .await
    }
}
