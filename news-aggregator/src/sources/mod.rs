//! Content-source integrations.
//!
//! Each source implements [`NewsSource`] and maps its own wire format into
//! the shared [`NewsItem`]. Sources are constructed from config; one with no
//! API key configured simply returns no items.

pub mod gnews;
pub mod newsdata;

pub use gnews::GNewsSource;
pub use newsdata::NewsDataSource;

use crate::config::AppConfig;
use crate::fetcher::Fetcher;
use crate::types::{NewsItem, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// What a fetch cycle asks every source for.
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub categories: Vec<String>,
    pub languages: Vec<String>,
    pub search_terms: Vec<String>,
}

impl SourceQuery {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            categories: config.categories.clone(),
            languages: config.languages.clone(),
            search_terms: config.search_terms.clone(),
        }
    }
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Stable identifier, as used in `enabled_sources` ("gnews").
    fn source_id(&self) -> &'static str;

    /// Human-readable name for logs and status displays.
    fn source_name(&self) -> &'static str;

    /// Fetch everything the query asks for. Individual request failures are
    /// logged and skipped; the call only errs on total breakage.
    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<NewsItem>>;
}

/// Country paired with each search language, following the product's
/// audience split: English news from the US edition, everything else Brazil.
pub(crate) fn country_for(language: &str) -> &'static str {
    if language == "en" {
        "us"
    } else {
        "br"
    }
}

/// Build the enabled sources from config. Unknown ids are logged and skipped.
pub fn enabled_sources(config: &AppConfig, fetcher: Arc<Fetcher>) -> Vec<Box<dyn NewsSource>> {
    let mut sources: Vec<Box<dyn NewsSource>> = Vec::new();
    for id in &config.enabled_sources {
        match id.as_str() {
            "gnews" => sources.push(Box::new(GNewsSource::new(
                fetcher.clone(),
                AppConfig::optional(&config.gnews_api_key).map(str::to_string),
            ))),
            "newsdata" => sources.push(Box::new(NewsDataSource::new(
                fetcher.clone(),
                AppConfig::optional(&config.newsdata_api_key).map(str::to_string),
            ))),
            other => warn!(source = %other, "unknown source id in config, skipping"),
        }
    }
    sources
}
