use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Contract types shared with the posting-target crates.
pub use interfaces::{NewsItem, OverlayCard, PostContent, PublishError, PublishReceipt};

/// A curated article waiting in the post queue.
///
/// Created by the aggregator once an article has survived the full curation
/// gauntlet; removed by the publish runner on post, by operator rejection,
/// or by clearing the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub original_title: String,
    pub refined_title: String,
    /// Hex digest of the canonical headline; unique across queue and history.
    pub semantic_key: String,
    pub description: Option<String>,
    /// Caption body produced by the curator's rewrite step.
    pub caption_body: String,
    pub image_url: String,
    pub source_name: Option<String>,
    pub category: String,
    pub language: String,
    pub source_api: String,
    /// Curation spend accumulated for this article so far, in USD.
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Compact queue row for listings and status payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSummary {
    pub id: String,
    pub title: String,
    pub category: String,
    pub source_api: String,
}

/// Final disposition of an article that left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Posted,
    Rejected,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Posted => "posted",
            PostStatus::Rejected => "rejected",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "posted" => Some(PostStatus::Posted),
            "rejected" => Some(PostStatus::Rejected),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

/// Input for one append-only history row.
#[derive(Debug, Clone)]
pub struct Disposition {
    pub original_title: String,
    pub refined_title: String,
    pub semantic_key: String,
    pub language: String,
    pub source_api: String,
    pub status: PostStatus,
    pub reason: Option<String>,
    pub cost_usd: f64,
}

impl QueueItem {
    /// History row for an item leaving the queue.
    pub fn disposition(&self, status: PostStatus, reason: Option<String>) -> Disposition {
        Disposition {
            original_title: self.original_title.clone(),
            refined_title: self.refined_title.clone(),
            semantic_key: self.semantic_key.clone(),
            language: self.language.clone(),
            source_api: self.source_api.clone(),
            status,
            reason,
            cost_usd: self.cost_usd,
        }
    }
}

/// A history row as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub original_title: String,
    pub refined_title: String,
    pub semantic_key: String,
    pub language: String,
    pub source_api: String,
    pub status: PostStatus,
    pub reason: Option<String>,
    pub cost_usd: f64,
    pub processed_at: DateTime<Utc>,
}

/// Severity of an event-sink entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(LogLevel::Info),
            "success" => Some(LogLevel::Success),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// One append-only event-sink entry, read back newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("queue item not found: {id}")]
    ItemNotFound { id: String },

    #[error("response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
