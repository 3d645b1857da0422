//! Derived system snapshot for operators and any front end that polls it.

use crate::curator::Curator;
use crate::store::Store;
use crate::types::{LogEntry, QueueSummary, Result};
use chrono::{DateTime, Utc};
use interfaces::Publisher;
use serde::Serialize;

/// How many event-sink entries a snapshot carries.
const SNAPSHOT_EVENTS: i64 = 30;

/// Point-in-time view of the whole pipeline. Never persisted; assembled
/// from the store, the scheduler bookkeeping, and the posting target.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub target_name: String,
    pub publisher_connected: bool,
    pub next_fetch_at: Option<DateTime<Utc>>,
    pub next_post_at: Option<DateTime<Utc>>,
    pub queue_len: i64,
    pub queue: Vec<QueueSummary>,
    pub session_cost_usd: f64,
    pub lifetime_cost_usd: f64,
    pub recent_events: Vec<LogEntry>,
}

impl SystemStatus {
    pub async fn collect(
        store: &Store,
        publisher: &dyn Publisher,
        curator: &dyn Curator,
        next_fetch_at: Option<DateTime<Utc>>,
        next_post_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let queue = store.list_queue().await?;
        Ok(Self {
            target_name: publisher.target_name().to_string(),
            publisher_connected: publisher.is_connected().await,
            next_fetch_at,
            next_post_at,
            queue_len: queue.len() as i64,
            queue,
            session_cost_usd: curator.session_cost().await,
            lifetime_cost_usd: store.lifetime_cost().await?,
            recent_events: store.recent_events(SNAPSHOT_EVENTS).await?,
        })
    }
}
