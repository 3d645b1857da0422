//! The publishing side of the pipeline: take the queue head (or a specific
//! item), render it, hand it to the posting target, and keep the books.

use crate::config::AppConfig;
use crate::curator::Curator;
use crate::media;
use crate::store::Store;
use crate::types::{
    AggregatorError, LogLevel, PostContent, PostStatus, PublishReceipt, QueueItem, Result,
};
use chrono::{NaiveTime, Utc};
use interfaces::Publisher;
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Instagram rejects captions longer than this.
const CAPTION_MAX_CHARS: usize = 2200;

/// Pre-publish pause, seconds. Posting the instant an item is picked reads
/// as automation; the original product waits a human-feeling beat.
const PUBLISH_DELAY_SECS: Range<f64> = 5.0..10.0;

pub struct PostRunner {
    store: Store,
    curator: Arc<dyn Curator>,
    publisher: Arc<dyn Publisher>,
    config: Arc<RwLock<AppConfig>>,
    publish_delay: Option<Range<f64>>,
}

impl PostRunner {
    pub fn new(
        store: Store,
        curator: Arc<dyn Curator>,
        publisher: Arc<dyn Publisher>,
        config: Arc<RwLock<AppConfig>>,
    ) -> Self {
        Self {
            store,
            curator,
            publisher,
            config,
            publish_delay: Some(PUBLISH_DELAY_SECS),
        }
    }

    /// Skip the humanized delay (tests).
    pub fn without_delay(mut self) -> Self {
        self.publish_delay = None;
        self
    }

    /// Publish the queue head. `Ok(None)` when the queue is empty or the
    /// daily cap is reached.
    pub async fn post_next(&self) -> Result<Option<PublishReceipt>> {
        let item = match self.store.next_in_queue().await? {
            Some(item) => item,
            None => {
                info!("post queue is empty");
                return Ok(None);
            }
        };
        self.publish_one(item).await
    }

    /// Publish a specific queued item, out of order.
    pub async fn post_item(&self, id: &str) -> Result<PublishReceipt> {
        let item = self
            .store
            .get_queued(id)
            .await?
            .ok_or_else(|| AggregatorError::ItemNotFound { id: id.to_string() })?;
        match self.publish_one(item).await? {
            Some(receipt) => Ok(receipt),
            None => Err(AggregatorError::General(
                "daily post cap reached".to_string(),
            )),
        }
    }

    /// Reject a queued item by id.
    ///
    /// An unknown id is a no-op on the queue and writes no event; the caller
    /// gets a typed not-found error instead.
    pub async fn reject_item(&self, id: &str) -> Result<()> {
        let item = self
            .store
            .get_queued(id)
            .await?
            .ok_or_else(|| AggregatorError::ItemNotFound { id: id.to_string() })?;

        self.store
            .record_disposition(&item.disposition(
                PostStatus::Rejected,
                Some("rejected manually".to_string()),
            ))
            .await?;
        self.store.remove_from_queue(&item.id).await?;
        self.store
            .log_event(
                LogLevel::Warning,
                &format!("Rejected: {}", item.refined_title),
            )
            .await?;
        info!(id = %item.id, title = %item.refined_title, "item rejected");
        Ok(())
    }

    /// Empty the queue unconditionally. Logs exactly one event.
    pub async fn clear_queue(&self) -> Result<u64> {
        let removed = self.store.clear_queue().await?;
        self.store
            .log_event(
                LogLevel::Info,
                &format!("Post queue cleared ({removed} items)"),
            )
            .await?;
        info!(removed, "post queue cleared");
        Ok(removed)
    }

    /// Successful posts so far in the current UTC day.
    pub async fn posts_today(&self) -> Result<i64> {
        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        self.store.posts_since(midnight).await
    }

    async fn publish_one(&self, item: QueueItem) -> Result<Option<PublishReceipt>> {
        let config = self.config.read().await.clone();

        if config.max_posts_per_day > 0 {
            let today = self.posts_today().await?;
            if today >= config.max_posts_per_day as i64 {
                warn!(cap = config.max_posts_per_day, "daily post cap reached");
                self.store
                    .log_event(
                        LogLevel::Warning,
                        &format!(
                            "Daily post cap reached ({}); not posting",
                            config.max_posts_per_day
                        ),
                    )
                    .await?;
                return Ok(None);
            }
        }

        info!(title = %item.refined_title, "starting publish");

        let mut cost_usd = item.cost_usd;
        let seed = format!("{} {}", item.refined_title, item.caption_body);
        let hashtags = self.curator.hashtags(&seed).await?;
        cost_usd += hashtags.cost_usd;

        let body = if item.caption_body.is_empty() {
            "Sem conteúdo adicional."
        } else {
            item.caption_body.as_str()
        };
        let source = item.source_name.as_deref().unwrap_or("Fonte não informada");
        let caption = compose_caption(
            &config.instagram_handle,
            body,
            source,
            &item.category,
            &hashtags.value,
        );

        let post = PostContent {
            image_url: item.image_url.clone(),
            caption,
            card: media::compose_card(&item.refined_title, &item.category, config.overlay_opacity),
        };

        if let Some(range) = &self.publish_delay {
            let secs = rand::thread_rng().gen_range(range.clone());
            info!(delay_secs = format!("{secs:.1}"), "waiting before publish");
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        }

        match self.publisher.publish(&post).await {
            Ok(receipt) => {
                let mut disposition = item.disposition(PostStatus::Posted, None);
                disposition.cost_usd = cost_usd;
                self.store.record_disposition(&disposition).await?;
                self.store.remove_from_queue(&item.id).await?;
                self.store
                    .log_event(
                        LogLevel::Success,
                        &format!("Posted: {}", item.refined_title),
                    )
                    .await?;
                info!(media_id = %receipt.media_id, "publish succeeded");
                Ok(Some(receipt))
            }
            Err(e) => {
                let mut disposition =
                    item.disposition(PostStatus::Failed, Some(e.to_string()));
                disposition.cost_usd = cost_usd;
                self.store.record_disposition(&disposition).await?;
                self.store.remove_from_queue(&item.id).await?;
                self.store
                    .log_event(
                        LogLevel::Error,
                        &format!("Publish failed: {} ({})", item.refined_title, e),
                    )
                    .await?;
                error!(error = %e, "publish failed");
                Err(e.into())
            }
        }
    }
}

/// Assemble the final caption in the product's house format.
pub fn compose_caption(
    handle: &str,
    body: &str,
    source: &str,
    category: &str,
    hashtags: &str,
) -> String {
    let prefix = if handle.is_empty() {
        String::new()
    } else {
        format!("siga: @{handle} | ")
    };
    let category_tag = format!("#{}", category.replace(' ', ""));
    let tail = if hashtags.is_empty() {
        category_tag
    } else {
        format!("{category_tag} {hashtags}")
    };

    let caption = format!("{prefix}{body}\n\nFonte: {source}\n\n{tail}");
    if caption.chars().count() <= CAPTION_MAX_CHARS {
        caption
    } else {
        caption.chars().take(CAPTION_MAX_CHARS).collect()
    }
}
