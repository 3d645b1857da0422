//! NewsData integration (newsdata.io, API v1).

use super::{country_for, NewsSource, SourceQuery};
use crate::fetcher::Fetcher;
use crate::types::{NewsItem, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};

const NEWSDATA_BASE_URL: &str = "https://newsdata.io";

pub struct NewsDataSource {
    fetcher: Arc<Fetcher>,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct NewsDataResponse {
    #[serde(default)]
    results: Vec<NewsDataArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsDataArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    image_url: Option<String>,
    source_id: Option<String>,
}

/// NewsData's category taxonomy differs from the one used in config.
fn remap_category(category: &str) -> &str {
    match category {
        "breaking-news" => "top",
        "nation" => "politics",
        other => other,
    }
}

impl NewsDataSource {
    pub fn new(fetcher: Arc<Fetcher>, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            api_key,
            base_url: NEWSDATA_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn map_articles(
        &self,
        articles: Vec<NewsDataArticle>,
        language: &str,
        category: &str,
    ) -> Vec<NewsItem> {
        articles
            .into_iter()
            .filter_map(|article| {
                let title = article.title?;
                Some(NewsItem {
                    title,
                    description: article.description,
                    content: article.content,
                    image_url: article.image_url,
                    source_name: article.source_id,
                    source_api: self.source_id().to_string(),
                    language: language.to_string(),
                    category: category.to_string(),
                })
            })
            .collect()
    }

    async fn latest(
        &self,
        api_key: &str,
        category: &str,
        language: &str,
        country: &str,
    ) -> Result<Vec<NewsItem>> {
        let url = format!("{}/api/1/news", self.base_url);
        let query = [
            ("apikey", api_key.to_string()),
            ("category", remap_category(category).to_string()),
            ("language", language.to_string()),
            ("country", country.to_string()),
        ];
        let response: NewsDataResponse = self.fetcher.get_json(&url, &query).await?;
        Ok(self.map_articles(response.results, language, category))
    }

    async fn search(
        &self,
        api_key: &str,
        term: &str,
        language: &str,
        country: &str,
    ) -> Result<Vec<NewsItem>> {
        let url = format!("{}/api/1/news", self.base_url);
        let query = [
            ("apikey", api_key.to_string()),
            ("q", term.to_string()),
            ("language", language.to_string()),
            ("country", country.to_string()),
        ];
        let response: NewsDataResponse = self.fetcher.get_json(&url, &query).await?;
        Ok(self.map_articles(response.results, language, term))
    }
}

#[async_trait]
impl NewsSource for NewsDataSource {
    fn source_id(&self) -> &'static str {
        "newsdata"
    }

    fn source_name(&self) -> &'static str {
        "NewsData"
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<NewsItem>> {
        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => {
                debug!("NewsData key not configured, skipping");
                return Ok(Vec::new());
            }
        };

        let mut items = Vec::new();

        for language in &query.languages {
            let country = country_for(language);

            for category in &query.categories {
                info!(category = %category, country = %country.to_uppercase(), "querying NewsData");
                match self.latest(&api_key, category, language, country).await {
                    Ok(mut fetched) => items.append(&mut fetched),
                    Err(e) => {
                        error!(category = %category, error = %e, "NewsData query failed");
                    }
                }
            }

            for term in &query.search_terms {
                match self.search(&api_key, term, language, country).await {
                    Ok(mut fetched) => items.append(&mut fetched),
                    Err(e) => {
                        error!(term = %term, error = %e, "NewsData search failed");
                    }
                }
            }
        }

        Ok(items)
    }
}
