//! GNews integration (gnews.io, API v4).

use super::{country_for, NewsSource, SourceQuery};
use crate::fetcher::Fetcher;
use crate::types::{NewsItem, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info};

const GNEWS_BASE_URL: &str = "https://gnews.io";
/// Articles requested per query; the free tier caps at 10.
const PAGE_SIZE: &str = "10";

pub struct GNewsSource {
    fetcher: Arc<Fetcher>,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GNewsResponse {
    #[serde(default)]
    articles: Vec<GNewsArticle>,
}

#[derive(Debug, Deserialize)]
struct GNewsArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    image: Option<String>,
    source: Option<GNewsOutlet>,
}

#[derive(Debug, Deserialize)]
struct GNewsOutlet {
    name: Option<String>,
}

impl GNewsSource {
    pub fn new(fetcher: Arc<Fetcher>, api_key: Option<String>) -> Self {
        Self {
            fetcher,
            api_key,
            base_url: GNEWS_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn map_articles(
        &self,
        articles: Vec<GNewsArticle>,
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
                    image_url: article.image,
                    source_name: article.source.and_then(|s| s.name),
                    source_api: self.source_id().to_string(),
                    language: language.to_string(),
                    category: category.to_string(),
                })
            })
            .collect()
    }

    async fn headlines(
        &self,
        api_key: &str,
        category: &str,
        language: &str,
        country: &str,
    ) -> Result<Vec<NewsItem>> {
        let url = format!("{}/api/v4/top-headlines", self.base_url);
        let query = [
            ("topic", category.to_string()),
            ("lang", language.to_string()),
            ("country", country.to_string()),
            ("max", PAGE_SIZE.to_string()),
            ("expand", "content".to_string()),
            ("apikey", api_key.to_string()),
        ];
        let response: GNewsResponse = self.fetcher.get_json(&url, &query).await?;
        Ok(self.map_articles(response.articles, language, category))
    }

    async fn search(
        &self,
        api_key: &str,
        term: &str,
        language: &str,
        country: &str,
    ) -> Result<Vec<NewsItem>> {
        let url = format!("{}/api/v4/search", self.base_url);
        let query = [
            ("q", term.to_string()),
            ("lang", language.to_string()),
            ("country", country.to_string()),
            ("max", PAGE_SIZE.to_string()),
            ("expand", "content".to_string()),
            ("apikey", api_key.to_string()),
        ];
        let response: GNewsResponse = self.fetcher.get_json(&url, &query).await?;
        Ok(self.map_articles(response.articles, language, term))
    }
}

#[async_trait]
impl NewsSource for GNewsSource {
    fn source_id(&self) -> &'static str {
        "gnews"
    }

    fn source_name(&self) -> &'static str {
        "GNews"
    }

    async fn fetch(&self, query: &SourceQuery) -> Result<Vec<NewsItem>> {
        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => {
                debug!("GNews key not configured, skipping");
                return Ok(Vec::new());
            }
        };

        let mut items = Vec::new();

        for language in &query.languages {
            let country = country_for(language);

            for category in &query.categories {
                info!(category = %category, country = %country.to_uppercase(), "querying GNews headlines");
                match self.headlines(&api_key, category, language, country).await {
                    Ok(mut fetched) => items.append(&mut fetched),
                    Err(e) => {
                        error!(category = %category, error = %e, "GNews headline query failed");
                    }
                }
            }

            for term in &query.search_terms {
                info!(term = %term, country = %country.to_uppercase(), "querying GNews search");
                match self.search(&api_key, term, language, country).await {
                    Ok(mut fetched) => items.append(&mut fetched),
                    Err(e) => {
                        error!(term = %term, error = %e, "GNews search query failed");
                    }
                }
            }
        }

        Ok(items)
    }
}
