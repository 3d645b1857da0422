//! The aggregation side of the pipeline: poll sources, curate, enqueue.

use crate::config::AppConfig;
use crate::curator::{Curator, Verdict};
use crate::fetcher::Fetcher;
use crate::media;
use crate::sources::{NewsSource, SourceQuery};
use crate::store::Store;
use crate::types::{Disposition, LogLevel, NewsItem, PostStatus, QueueItem, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Counts for one fetch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    pub fetched: usize,
    pub enqueued: usize,
    pub rejected: usize,
    pub skipped: usize,
}

enum ItemOutcome {
    Enqueued,
    Rejected,
    Skipped,
}

pub struct NewsAggregator {
    sources: Vec<Box<dyn NewsSource>>,
    curator: Arc<dyn Curator>,
    store: Store,
    fetcher: Arc<Fetcher>,
    config: Arc<RwLock<AppConfig>>,
}

impl NewsAggregator {
    pub fn new(
        sources: Vec<Box<dyn NewsSource>>,
        curator: Arc<dyn Curator>,
        store: Store,
        fetcher: Arc<Fetcher>,
        config: Arc<RwLock<AppConfig>>,
    ) -> Self {
        Self {
            sources,
            curator,
            store,
            fetcher,
            config,
        }
    }

    /// Run one full fetch cycle: poll every source, curate every article,
    /// enqueue the survivors. Source failures are isolated; store failures
    /// abort the cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let config = self.config.read().await.clone();
        let query = SourceQuery::from_config(&config);

        info!(sources = self.sources.len(), "fetch cycle started");
        self.store
            .log_event(
                LogLevel::Info,
                &format!("Fetch cycle started ({} sources)", self.sources.len()),
            )
            .await?;

        let mut items: Vec<NewsItem> = Vec::new();
        for source in &self.sources {
            match source.fetch(&query).await {
                Ok(mut fetched) => {
                    info!(source = source.source_name(), count = fetched.len(), "source fetched");
                    items.append(&mut fetched);
                }
                Err(e) => {
                    error!(source = source.source_name(), error = %e, "source failed");
                    self.store
                        .log_event(
                            LogLevel::Error,
                            &format!("{} fetch failed: {}", source.source_name(), e),
                        )
                        .await?;
                }
            }
        }

        let mut outcome = CycleOutcome {
            fetched: items.len(),
            ..Default::default()
        };

        for item in items {
            match self.process_item(item).await? {
                ItemOutcome::Enqueued => outcome.enqueued += 1,
                ItemOutcome::Rejected => outcome.rejected += 1,
                ItemOutcome::Skipped => outcome.skipped += 1,
            }
        }

        info!(?outcome, "fetch cycle finished");
        self.store
            .log_event(
                LogLevel::Info,
                &format!(
                    "Fetch cycle finished: {} fetched, {} queued, {} rejected, {} skipped",
                    outcome.fetched, outcome.enqueued, outcome.rejected, outcome.skipped
                ),
            )
            .await?;

        Ok(outcome)
    }

    /// Curate one fetched article. Soft failures (bad image, duplicate,
    /// irrelevant) resolve the item; only store errors propagate.
    async fn process_item(&self, item: NewsItem) -> Result<ItemOutcome> {
        if item.title.trim().is_empty() {
            debug!("skipping article without title");
            return Ok(ItemOutcome::Skipped);
        }

        let image_url = match &item.image_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => {
                debug!(title = %item.title, "skipping article without image");
                return Ok(ItemOutcome::Skipped);
            }
        };
        if let Err(e) = media::probe_image(&self.fetcher, &image_url).await {
            debug!(title = %item.title, error = %e, "skipping article with unusable image");
            return Ok(ItemOutcome::Skipped);
        }

        let original_title = strip_outlet_suffix(&item.title).to_string();
        let body = item
            .content
            .clone()
            .or_else(|| item.description.clone())
            .unwrap_or_default();

        let mut cost_usd = 0.0;

        // Dedup on the canonical headline so rewrites of the same event
        // across outlets collapse to one key.
        let canonical = self
            .curator
            .canonical_headline(&original_title, &body)
            .await?;
        cost_usd += canonical.cost_usd;
        let semantic_key = match canonical.value {
            Some(headline) => semantic_key_of(&headline),
            None => semantic_key_of(&original_title.trim().to_lowercase()),
        };

        if self.store.semantic_key_seen(&semantic_key).await? {
            self.store
                .record_disposition(&Disposition {
                    original_title: original_title.clone(),
                    refined_title: format!("[DUPLICATE] {}", clip(&original_title, 150)),
                    semantic_key,
                    language: item.language.clone(),
                    source_api: item.source_api.clone(),
                    status: PostStatus::Rejected,
                    reason: Some("semantic duplicate".to_string()),
                    cost_usd,
                })
                .await?;
            return Ok(ItemOutcome::Rejected);
        }

        let relevance = self.curator.check_relevance(&original_title, &body).await?;
        cost_usd += relevance.cost_usd;
        if let Verdict::Rejected(reason) = relevance.value {
            self.store
                .record_disposition(&Disposition {
                    original_title: original_title.clone(),
                    refined_title: format!("[REJECTED] {}", clip(&original_title, 150)),
                    semantic_key,
                    language: item.language.clone(),
                    source_api: item.source_api.clone(),
                    status: PostStatus::Rejected,
                    reason: Some(reason),
                    cost_usd,
                })
                .await?;
            return Ok(ItemOutcome::Rejected);
        }

        // The product posts in Portuguese; English articles get translated.
        let (title, body) = if item.language == "en" {
            let title = self.curator.translate(&original_title, "English").await?;
            let body_t = self.curator.translate(&body, "English").await?;
            cost_usd += title.cost_usd + body_t.cost_usd;
            (title.value, body_t.value)
        } else {
            (original_title.clone(), body)
        };

        let refined = self.curator.refine_title(&title).await?;
        cost_usd += refined.cost_usd;

        let caption = self.curator.rewrite_caption(&body).await?;
        cost_usd += caption.cost_usd;

        let category = self
            .curator
            .categorize(&refined.value, &caption.value)
            .await?;
        cost_usd += category.cost_usd;

        let queued = QueueItem {
            id: QueueItem::new_id(),
            original_title,
            refined_title: refined.value,
            semantic_key,
            description: item.description,
            caption_body: caption.value,
            image_url,
            source_name: item.source_name,
            category: category.value,
            language: item.language,
            source_api: item.source_api,
            cost_usd,
            created_at: Utc::now(),
        };

        if self.store.enqueue(&queued).await? {
            debug!(title = %queued.refined_title, "article queued");
            Ok(ItemOutcome::Enqueued)
        } else {
            // Lost a race with another article carrying the same key.
            Ok(ItemOutcome::Rejected)
        }
    }
}

/// Headlines often arrive as "Title - Outlet Name"; keep only the title.
fn strip_outlet_suffix(title: &str) -> &str {
    match title.rfind(" - ") {
        Some(idx) => &title[..idx],
        None => title,
    }
}

fn semantic_key_of(canonical: &str) -> String {
    let hash = Sha256::digest(canonical.as_bytes());
    format!("{:x}", hash)
}

fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
