//! Memory Store
//!
//! Append-only record of conversation turns, facts and document references.
//! Records are never deleted or edited; `tombstone` hides a record from default
//! queries while keeping it available to audits that ask for it explicitly.
//!
//! Every `append` is a single autocommitted INSERT on a `synchronous=FULL`
//! connection, so it is on disk before the call returns.

use chrono::{DateTime, TimeZone, Utc};
use sdk::errors::ResearchError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Record type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Conversation,
    Fact,
    DocumentReference,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Fact => "fact",
            MemoryKind::DocumentReference => "document_reference",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation turn",
            MemoryKind::Fact => "fact",
            MemoryKind::DocumentReference => "document reference",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" | "turn" => Ok(MemoryKind::Conversation),
            "fact" => Ok(MemoryKind::Fact),
            "document_reference" | "document" | "doc" => Ok(MemoryKind::DocumentReference),
            other => Err(format!(
                "unknown record kind '{}' (expected conversation, fact or document_reference)",
                other
            )),
        }
    }
}

/// A persisted memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub kind: MemoryKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub tombstoned: bool,
}

impl MemoryRecord {
    /// Look up a metadata string value
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

/// A record that has not been appended yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemoryRecord {
    pub kind: MemoryKind,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
}

impl NewMemoryRecord {
    pub fn new(kind: MemoryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn conversation(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::Conversation, content)
    }

    pub fn fact(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::Fact, content)
    }

    pub fn document_reference(content: impl Into<String>) -> Self {
        Self::new(MemoryKind::DocumentReference, content)
    }

    /// Add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Human-readable name used in storage failure messages
    fn describe(&self) -> String {
        describe_record(self.kind, &self.content)
    }
}

fn describe_record(kind: MemoryKind, content: &str) -> String {
    const PREVIEW_CHARS: usize = 40;
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!("{} '{}'", kind.label(), preview)
}

/// Filter for `MemoryStore::query`
///
/// The default filter matches every live record, newest first.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Restrict to these kinds; empty means all kinds
    pub kinds: Vec<MemoryKind>,
    /// Inclusive lower bound on creation time
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on creation time
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive substring, or full-text terms when `by_relevance` is set
    pub text: Option<String>,
    pub include_tombstoned: bool,
    /// Order by bm25 relevance instead of recency
    pub by_relevance: bool,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = MemoryKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn include_tombstoned(mut self) -> Self {
        self.include_tombstoned = true;
        self
    }

    pub fn by_relevance(mut self) -> Self {
        self.by_relevance = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Turn free text into an FTS5 query: every term quoted, terms OR-ed together
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Handle to the append-only memory log
///
/// Cheap to clone; all clones share the same connection pool, so concurrent
/// plans can append through their own handle.
#[derive(Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
}

impl MemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Durably append a record and return it with its assigned id
    pub async fn append(&self, record: NewMemoryRecord) -> Result<MemoryRecord, ResearchError> {
        let metadata = match &record.metadata {
            Some(map) => Some(
                serde_json::to_string(map)
                    .map_err(|e| ResearchError::storage(record.describe(), e))?,
            ),
            None => None,
        };
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO memory_records (kind, content, metadata, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(record.kind.as_str())
        .bind(&record.content)
        .bind(metadata)
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| ResearchError::storage(record.describe(), e))?;

        let id = result.last_insert_rowid();
        debug!(id, kind = %record.kind, "Appended memory record");

        Ok(MemoryRecord {
            id,
            kind: record.kind,
            content: record.content,
            metadata: record.metadata,
            // Millisecond precision, matching what a later read returns
            created_at: from_millis(created_at.timestamp_millis()),
            tombstoned: false,
        })
    }

    /// Fetch one record by id, tombstoned or not
    pub async fn get(&self, id: i64) -> Result<Option<MemoryRecord>, ResearchError> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, content, metadata, created_at, tombstoned
            FROM memory_records
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ResearchError::storage(format!("record {}", id), e))?;

        row.map(|r| row_to_record(&r)).transpose()
    }

    /// Query records matching a filter
    ///
    /// Results are newest first unless `by_relevance` is set and text is given,
    /// in which case the best bm25 match comes first.
    pub async fn query(&self, filter: &MemoryFilter) -> Result<Vec<MemoryRecord>, ResearchError> {
        let fts = if filter.by_relevance {
            filter.text.as_deref().and_then(fts_query)
        } else {
            None
        };

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT m.id, m.kind, m.content, m.metadata, m.created_at, m.tombstoned FROM memory_records m",
        );

        if fts.is_some() {
            builder.push(" JOIN memory_records_fts ON memory_records_fts.rowid = m.id");
        }
        builder.push(" WHERE 1 = 1");

        if let Some(fts) = &fts {
            builder.push(" AND memory_records_fts MATCH ").push_bind(fts.clone());
        } else if let Some(text) = filter.text.as_deref().filter(|t| !t.is_empty()) {
            builder
                .push(" AND instr(lower(m.content), lower(")
                .push_bind(text.to_string())
                .push(")) > 0");
        }

        if !filter.kinds.is_empty() {
            builder.push(" AND m.kind IN (");
            let mut separated = builder.separated(", ");
            for kind in &filter.kinds {
                separated.push_bind(kind.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(since) = filter.since {
            builder
                .push(" AND m.created_at >= ")
                .push_bind(since.timestamp_millis());
        }
        if let Some(until) = filter.until {
            builder
                .push(" AND m.created_at < ")
                .push_bind(until.timestamp_millis());
        }
        if !filter.include_tombstoned {
            builder.push(" AND m.tombstoned = 0");
        }

        if fts.is_some() {
            builder.push(" ORDER BY bm25(memory_records_fts), m.id DESC");
        } else {
            builder.push(" ORDER BY m.created_at DESC, m.id DESC");
        }

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ResearchError::storage("memory query", e))?;

        rows.iter().map(row_to_record).collect()
    }

    /// Most recent live records of one kind
    pub async fn recent(
        &self,
        kind: MemoryKind,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, ResearchError> {
        self.query(&MemoryFilter::new().kind(kind).limit(limit)).await
    }

    /// Mark a record as logically deleted
    ///
    /// Returns the record as it now stands, or `None` if no such id exists.
    /// Tombstoning twice is a no-op.
    pub async fn tombstone(&self, id: i64) -> Result<Option<MemoryRecord>, ResearchError> {
        let updated = sqlx::query(
            "UPDATE memory_records SET tombstoned = 1 WHERE id = ? AND tombstoned = 0",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| ResearchError::storage(format!("tombstone for record {}", id), e))?;

        if updated.rows_affected() > 0 {
            debug!(id, "Tombstoned memory record");
        }

        self.get(id).await
    }

    /// Count every record ever appended, optionally of one kind
    ///
    /// Tombstoned records are counted; the log never shrinks.
    pub async fn count(&self, kind: Option<MemoryKind>) -> Result<i64, ResearchError> {
        let count: Result<i64, sqlx::Error> = match kind {
            Some(kind) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM memory_records WHERE kind = ?")
                    .bind(kind.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM memory_records")
                    .fetch_one(&self.pool)
                    .await
            }
        };

        count.map_err(|e| ResearchError::storage("record count", e))
    }
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn row_to_record(row: &SqliteRow) -> Result<MemoryRecord, ResearchError> {
    let id: i64 = row
        .try_get("id")
        .map_err(|e| ResearchError::storage("memory row", e))?;
    let context = || format!("record {}", id);

    let kind: String = row
        .try_get("kind")
        .map_err(|e| ResearchError::storage(context(), e))?;
    let kind = MemoryKind::from_str(&kind).map_err(|e| ResearchError::storage(context(), e))?;

    let metadata: Option<String> = row
        .try_get("metadata")
        .map_err(|e| ResearchError::storage(context(), e))?;
    let metadata = match metadata {
        Some(text) => Some(
            serde_json::from_str::<Map<String, Value>>(&text)
                .map_err(|e| ResearchError::storage(context(), e))?,
        ),
        None => None,
    };

    Ok(MemoryRecord {
        id,
        kind,
        content: row
            .try_get("content")
            .map_err(|e| ResearchError::storage(context(), e))?,
        metadata,
        created_at: from_millis(
            row.try_get("created_at")
                .map_err(|e| ResearchError::storage(context(), e))?,
        ),
        tombstoned: row
            .try_get::<i64, _>("tombstoned")
            .map_err(|e| ResearchError::storage(context(), e))?
            != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn store() -> (TempDir, MemoryStore) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("memory.db")).await.unwrap();
        (dir, db.memory())
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_ids() {
        let (_dir, store) = store().await;

        let a = store.append(NewMemoryRecord::fact("first")).await.unwrap();
        let b = store
            .append(NewMemoryRecord::document_reference("second"))
            .await
            .unwrap();
        let c = store.append(NewMemoryRecord::conversation("third")).await.unwrap();

        assert!(a.id < b.id && b.id < c.id);
    }

    #[tokio::test]
    async fn test_identical_content_is_not_deduplicated() {
        let (_dir, store) = store().await;

        let a = store.append(NewMemoryRecord::fact("same")).await.unwrap();
        let b = store.append(NewMemoryRecord::fact("same")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.count(Some(MemoryKind::Fact)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_newest_first_and_kind_filter() {
        let (_dir, store) = store().await;

        store.append(NewMemoryRecord::fact("old fact")).await.unwrap();
        store.append(NewMemoryRecord::conversation("turn")).await.unwrap();
        store.append(NewMemoryRecord::fact("new fact")).await.unwrap();

        let facts = store
            .query(&MemoryFilter::new().kind(MemoryKind::Fact))
            .await
            .unwrap();
        let contents: Vec<_> = facts.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["new fact", "old fact"]);

        let all = store.query(&MemoryFilter::new()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_substring_match_is_case_insensitive() {
        let (_dir, store) = store().await;

        store
            .append(NewMemoryRecord::fact("The EU adopted a Climate Law"))
            .await
            .unwrap();
        store.append(NewMemoryRecord::fact("unrelated")).await.unwrap();

        let hits = store
            .query(&MemoryFilter::new().text("climate law"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("Climate"));
    }

    #[tokio::test]
    async fn test_relevance_ordering() {
        let (_dir, store) = store().await;

        store
            .append(NewMemoryRecord::fact("solar power output rose"))
            .await
            .unwrap();
        store
            .append(NewMemoryRecord::fact("solar solar solar panels and solar power"))
            .await
            .unwrap();
        store.append(NewMemoryRecord::fact("wind farms")).await.unwrap();

        let hits = store
            .query(&MemoryFilter::new().text("solar").by_relevance())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].content.starts_with("solar solar"));
    }

    #[tokio::test]
    async fn test_tombstone_hides_from_default_query_only() {
        let (_dir, store) = store().await;

        let record = store.append(NewMemoryRecord::fact("retracted")).await.unwrap();
        let tombstoned = store.tombstone(record.id).await.unwrap().unwrap();
        assert!(tombstoned.tombstoned);
        assert_eq!(tombstoned.content, "retracted");

        let default = store.query(&MemoryFilter::new()).await.unwrap();
        assert!(default.iter().all(|r| r.id != record.id));

        let audit = store
            .query(&MemoryFilter::new().include_tombstoned())
            .await
            .unwrap();
        assert!(audit.iter().any(|r| r.id == record.id));

        // Idempotent, and missing ids are reported as None
        assert!(store.tombstone(record.id).await.unwrap().is_some());
        assert!(store.tombstone(record.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_date_range_filter() {
        let (_dir, store) = store().await;

        let record = store.append(NewMemoryRecord::fact("dated")).await.unwrap();

        let inside = store
            .query(
                &MemoryFilter::new()
                    .since(record.created_at)
                    .until(record.created_at + chrono::Duration::seconds(1)),
            )
            .await
            .unwrap();
        assert_eq!(inside.len(), 1);

        let before = store
            .query(&MemoryFilter::new().until(record.created_at))
            .await
            .unwrap();
        assert!(before.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let (_dir, store) = store().await;

        let record = store
            .append(
                NewMemoryRecord::document_reference("IPCC report")
                    .with_metadata("source", "https://ipcc.ch")
                    .with_metadata("confidence", 0.9),
            )
            .await
            .unwrap();

        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
        assert_eq!(fetched.meta_str("source"), Some("https://ipcc.ch"));
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let (_dir, store) = store().await;

        for i in 0..5 {
            store
                .append(NewMemoryRecord::conversation(format!("turn {i}")))
                .await
                .unwrap();
        }

        let recent = store.recent(MemoryKind::Conversation, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "turn 4");
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(fts_query("a \"b\""), Some("\"a\" OR \"\"\"b\"\"\"".to_string()));
        assert_eq!(fts_query("   "), None);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("fact".parse::<MemoryKind>().unwrap(), MemoryKind::Fact);
        assert_eq!(
            "document".parse::<MemoryKind>().unwrap(),
            MemoryKind::DocumentReference
        );
        assert!("note".parse::<MemoryKind>().is_err());
    }
}
