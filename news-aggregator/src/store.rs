//! SQLite persistence: the post queue, the append-only history, the
//! event sink, and lifetime counters.
//!
//! The schema is created on open with idempotent statements, so a fresh
//! database file needs no external migration step. Queue ordering is FIFO by
//! creation time, with the rowid as tiebreaker for same-instant inserts.

use crate::types::{
    AggregatorError, Disposition, HistoryRecord, LogEntry, LogLevel, PostStatus, QueueItem,
    QueueSummary, Result,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Event rows kept after each append.
const EVENT_RETENTION: i64 = 500;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(%path, "store ready");
        Ok(store)
    }

    /// In-memory database for tests. Single connection: each connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS post_queue (
                id TEXT PRIMARY KEY,
                original_title TEXT NOT NULL,
                refined_title TEXT NOT NULL,
                semantic_key TEXT NOT NULL UNIQUE,
                description TEXT,
                caption_body TEXT NOT NULL,
                image_url TEXT NOT NULL,
                source_name TEXT,
                category TEXT NOT NULL,
                language TEXT NOT NULL,
                source_api TEXT NOT NULL,
                cost_usd REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                original_title TEXT NOT NULL,
                refined_title TEXT NOT NULL,
                semantic_key TEXT NOT NULL UNIQUE,
                language TEXT NOT NULL,
                source_api TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                cost_usd REAL NOT NULL DEFAULT 0,
                processed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                at TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stats (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO stats (key, value) VALUES ('lifetime_cost_usd', 0.0)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Insert a curated item. Returns false when the semantic key is already
    /// queued (duplicate enqueue is a silent no-op).
    pub async fn enqueue(&self, item: &QueueItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO post_queue (
                id, original_title, refined_title, semantic_key, description,
                caption_body, image_url, source_name, category, language,
                source_api, cost_usd, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.original_title)
        .bind(&item.refined_title)
        .bind(&item.semantic_key)
        .bind(&item.description)
        .bind(&item.caption_body)
        .bind(&item.image_url)
        .bind(&item.source_name)
        .bind(&item.category)
        .bind(&item.language)
        .bind(&item.source_api)
        .bind(item.cost_usd)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            debug!(id = %item.id, title = %item.refined_title, "enqueued");
        }
        Ok(inserted)
    }

    /// Head of the queue (oldest item), without removing it.
    pub async fn next_in_queue(&self) -> Result<Option<QueueItem>> {
        let row = sqlx::query(
            "SELECT * FROM post_queue ORDER BY created_at ASC, rowid ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| queue_item_from_row(&r)).transpose()
    }

    pub async fn get_queued(&self, id: &str) -> Result<Option<QueueItem>> {
        let row = sqlx::query("SELECT * FROM post_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| queue_item_from_row(&r)).transpose()
    }

    /// Remove one item by id. Returns false if it was not queued.
    pub async fn remove_from_queue(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM post_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Empty the queue unconditionally. Returns the number of removed items.
    pub async fn clear_queue(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM post_queue")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn queue_len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM post_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Full queue in posting order, as compact summaries.
    pub async fn list_queue(&self) -> Result<Vec<QueueSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, refined_title, category, source_api
            FROM post_queue ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(QueueSummary {
                    id: row.try_get("id")?,
                    title: row.try_get("refined_title")?,
                    category: row.try_get("category")?,
                    source_api: row.try_get("source_api")?,
                })
            })
            .collect()
    }

    /// True if this semantic key already lives in the queue or the history.
    pub async fn semantic_key_seen(&self, key: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM post_queue WHERE semantic_key = ?
                UNION
                SELECT 1 FROM history WHERE semantic_key = ?
            ) AS seen
            "#,
        )
        .bind(key)
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        let seen: i64 = row.try_get("seen")?;
        Ok(seen != 0)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Append one disposition row and add its cost to the lifetime counter.
    ///
    /// The semantic key is unique in history; a repeat disposition is ignored
    /// but its cost still counts (the spend happened either way).
    pub async fn record_disposition(&self, disposition: &Disposition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO history (
                id, original_title, refined_title, semantic_key, language,
                source_api, status, reason, cost_usd, processed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&disposition.original_title)
        .bind(&disposition.refined_title)
        .bind(&disposition.semantic_key)
        .bind(&disposition.language)
        .bind(&disposition.source_api)
        .bind(disposition.status.as_str())
        .bind(&disposition.reason)
        .bind(disposition.cost_usd)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE stats SET value = value + ? WHERE key = 'lifetime_cost_usd'")
            .bind(disposition.cost_usd)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Successful posts at or after `since` (daily-cap accounting).
    pub async fn posts_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM history WHERE status = 'posted' AND processed_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM history ORDER BY processed_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status_text: String = row.try_get("status")?;
                let status = PostStatus::parse(&status_text).ok_or_else(|| {
                    AggregatorError::General(format!("unknown history status: {status_text}"))
                })?;
                Ok(HistoryRecord {
                    id: row.try_get("id")?,
                    original_title: row.try_get("original_title")?,
                    refined_title: row.try_get("refined_title")?,
                    semantic_key: row.try_get("semantic_key")?,
                    language: row.try_get("language")?,
                    source_api: row.try_get("source_api")?,
                    status,
                    reason: row.try_get("reason")?,
                    cost_usd: row.try_get("cost_usd")?,
                    processed_at: row.try_get("processed_at")?,
                })
            })
            .collect()
    }

    pub async fn lifetime_cost(&self) -> Result<f64> {
        let row = sqlx::query("SELECT value FROM stats WHERE key = 'lifetime_cost_usd'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("value")?)
    }

    // -----------------------------------------------------------------------
    // Event sink
    // -----------------------------------------------------------------------

    /// Append one event and prune the sink to the retention window.
    pub async fn log_event(&self, level: LogLevel, message: &str) -> Result<()> {
        sqlx::query("INSERT INTO events (at, level, message) VALUES (?, ?, ?)")
            .bind(Utc::now())
            .bind(level.as_str())
            .bind(message)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM events WHERE id NOT IN (
                SELECT id FROM events ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(EVENT_RETENTION)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Events, newest first.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query("SELECT * FROM events ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let level_text: String = row.try_get("level")?;
                let level = LogLevel::parse(&level_text).ok_or_else(|| {
                    AggregatorError::General(format!("unknown event level: {level_text}"))
                })?;
                Ok(LogEntry {
                    id: row.try_get("id")?,
                    at: row.try_get("at")?,
                    level,
                    message: row.try_get("message")?,
                })
            })
            .collect()
    }
}

fn queue_item_from_row(row: &SqliteRow) -> Result<QueueItem> {
    Ok(QueueItem {
        id: row.try_get("id")?,
        original_title: row.try_get("original_title")?,
        refined_title: row.try_get("refined_title")?,
        semantic_key: row.try_get("semantic_key")?,
        description: row.try_get("description")?,
        caption_body: row.try_get("caption_body")?,
        image_url: row.try_get("image_url")?,
        source_name: row.try_get("source_name")?,
        category: row.try_get("category")?,
        language: row.try_get("language")?,
        source_api: row.try_get("source_api")?,
        cost_usd: row.try_get("cost_usd")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item(key: &str, title: &str) -> QueueItem {
        QueueItem {
            id: QueueItem::new_id(),
            original_title: title.to_string(),
            refined_title: title.to_string(),
            semantic_key: key.to_string(),
            description: None,
            caption_body: "corpo".to_string(),
            image_url: "https://example.com/img.jpg".to_string(),
            source_name: Some("Example".to_string()),
            category: "Geral".to_string(),
            language: "pt".to_string(),
            source_api: "gnews".to_string(),
            cost_usd: 0.001,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn queue_is_fifo_with_insertion_tiebreak() {
        let store = Store::open_in_memory().await.unwrap();
        store.enqueue(&sample_item("k1", "primeiro")).await.unwrap();
        store.enqueue(&sample_item("k2", "segundo")).await.unwrap();
        store.enqueue(&sample_item("k3", "terceiro")).await.unwrap();

        let head = store.next_in_queue().await.unwrap().unwrap();
        assert_eq!(head.refined_title, "primeiro");

        let listed = store.list_queue().await.unwrap();
        let titles: Vec<&str> = listed.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["primeiro", "segundo", "terceiro"]);
    }

    #[tokio::test]
    async fn duplicate_semantic_key_is_silent_noop() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.enqueue(&sample_item("dup", "a")).await.unwrap());
        assert!(!store.enqueue(&sample_item("dup", "b")).await.unwrap());
        assert_eq!(store.queue_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn semantic_key_seen_checks_queue_and_history() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(!store.semantic_key_seen("k").await.unwrap());

        let item = sample_item("k", "na fila");
        store.enqueue(&item).await.unwrap();
        assert!(store.semantic_key_seen("k").await.unwrap());

        store.clear_queue().await.unwrap();
        assert!(!store.semantic_key_seen("k").await.unwrap());

        store
            .record_disposition(&item.disposition(PostStatus::Posted, None))
            .await
            .unwrap();
        assert!(store.semantic_key_seen("k").await.unwrap());
    }

    #[tokio::test]
    async fn disposition_accumulates_lifetime_cost() {
        let store = Store::open_in_memory().await.unwrap();
        let item = sample_item("k1", "a");
        store
            .record_disposition(&item.disposition(PostStatus::Rejected, Some("dup".into())))
            .await
            .unwrap();
        let other = sample_item("k2", "b");
        store
            .record_disposition(&other.disposition(PostStatus::Posted, None))
            .await
            .unwrap();

        let total = store.lifetime_cost().await.unwrap();
        assert!((total - 0.002).abs() < 1e-9);

        let history = store.recent_history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest first.
        assert_eq!(history[0].status, PostStatus::Posted);
    }

    #[tokio::test]
    async fn events_read_newest_first_and_are_pruned() {
        let store = Store::open_in_memory().await.unwrap();
        for i in 0..(EVENT_RETENTION + 20) {
            store
                .log_event(LogLevel::Info, &format!("evento {i}"))
                .await
                .unwrap();
        }

        let recent = store.recent_events(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].message, format!("evento {}", EVENT_RETENTION + 19));

        let all = store.recent_events(EVENT_RETENTION * 2).await.unwrap();
        assert_eq!(all.len() as i64, EVENT_RETENTION);
    }

    #[tokio::test]
    async fn posts_since_counts_only_posted() {
        let store = Store::open_in_memory().await.unwrap();
        let start = Utc::now() - chrono::Duration::minutes(1);

        store
            .record_disposition(&sample_item("a", "a").disposition(PostStatus::Posted, None))
            .await
            .unwrap();
        store
            .record_disposition(
                &sample_item("b", "b").disposition(PostStatus::Failed, Some("erro".into())),
            )
            .await
            .unwrap();

        assert_eq!(store.posts_since(start).await.unwrap(), 1);
    }
}
