//! AI curation of fetched articles.
//!
//! The `Curator` trait captures every model call the pipeline makes, each
//! returning its value together with the call's cost in USD so spend can be
//! tracked per article and per session. `GeminiCurator` talks to the
//! Generative Language REST API; `MockCurator` gives tests deterministic
//! answers at a fixed cost.

use crate::types::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Model pricing per 1M tokens, USD.
const PRICE_INPUT_USD_1M: f64 = 0.10;
const PRICE_OUTPUT_USD_1M: f64 = 0.40;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

/// A curation result plus what it cost to produce.
#[derive(Debug, Clone)]
pub struct Curated<T> {
    pub value: T,
    pub cost_usd: f64,
}

impl<T> Curated<T> {
    pub fn free(value: T) -> Self {
        Self {
            value,
            cost_usd: 0.0,
        }
    }
}

/// Relevance gate outcome. `Rejected` carries the verdict text for history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected(String),
}

#[async_trait]
pub trait Curator: Send + Sync {
    fn curator_name(&self) -> String;

    /// Ultra-short canonical headline used for cross-source dedup.
    /// `None` means the model was unavailable; callers fall back to the raw title.
    async fn canonical_headline(&self, title: &str, body: &str)
        -> Result<Curated<Option<String>>>;

    /// Is this genuine news, or promo/clickbait?
    async fn check_relevance(&self, title: &str, body: &str) -> Result<Curated<Verdict>>;

    /// Translate to Brazilian Portuguese, keeping the journalistic tone.
    async fn translate(&self, text: &str, source_language: &str) -> Result<Curated<String>>;

    /// Clean up punctuation and clarity of a headline.
    async fn refine_title(&self, title: &str) -> Result<Curated<String>>;

    /// Rewrite the article body as a caption: summary paragraph plus hook.
    async fn rewrite_caption(&self, body: &str) -> Result<Curated<String>>;

    /// A specific category of at most two words.
    async fn categorize(&self, title: &str, body: &str) -> Result<Curated<String>>;

    /// Three topical hashtags, space separated.
    async fn hashtags(&self, seed: &str) -> Result<Curated<String>>;

    /// Total spend since this curator was created, USD.
    async fn session_cost(&self) -> f64;
}

// ---------------------------------------------------------------------------
// Gemini implementation
// ---------------------------------------------------------------------------

pub struct GeminiCurator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    session_cost: Arc<RwLock<f64>>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

impl GeminiCurator {
    pub fn new(api_key: Option<String>, client: Client) -> Self {
        Self {
            client,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            session_cost: Arc::new(RwLock::new(0.0)),
        }
    }

    /// Point the curator at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One model call. Returns `None` when the key is missing or the call
    /// fails; curation degrades to passthrough rather than stalling the
    /// pipeline over a flaky model endpoint.
    async fn call_model(&self, prompt: &str, operation: &str) -> Option<(String, f64)> {
        let api_key = match &self.api_key {
            Some(key) => key,
            None => {
                debug!(operation, "no model key configured, skipping call");
                return None;
            }
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, GEMINI_MODEL
        );
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = match self
            .client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .json(&request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(operation, error = %e, "model call failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(operation, status = response.status().as_u16(), "model call rejected");
            return None;
        }

        let body: GenerateResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(operation, error = %e, "model response undecodable");
                return None;
            }
        };

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
            .map(|t| t.trim().to_string())?;

        let cost = body
            .usage_metadata
            .map(|u| {
                (u.prompt_token_count as f64 / 1_000_000.0) * PRICE_INPUT_USD_1M
                    + (u.candidates_token_count as f64 / 1_000_000.0) * PRICE_OUTPUT_USD_1M
            })
            .unwrap_or(0.0);

        *self.session_cost.write().await += cost;
        Some((text, cost))
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Strip a leading list marker ("1. ", "- ", "* ") the model sometimes adds.
fn scrub_list_marker(s: &str) -> &str {
    s.trim_start_matches(|c: char| {
        c.is_ascii_digit() || c == '.' || c == '-' || c == '*' || c.is_whitespace()
    })
}

#[async_trait]
impl Curator for GeminiCurator {
    fn curator_name(&self) -> String {
        format!("gemini ({})", GEMINI_MODEL)
    }

    async fn canonical_headline(
        &self,
        title: &str,
        body: &str,
    ) -> Result<Curated<Option<String>>> {
        let prompt = format!(
            "You index news wire stories. Read a headline and the opening of an \
             article and produce one canonical, factual, ultra-short headline \
             (at most 10 words) capturing the event, so that stories about the \
             SAME event from different outlets yield IDENTICAL canonical \
             headlines. Standardize entity names, drop outlet names and \
             opinionated wording. Return ONLY the canonical headline.\n\n\
             Headline: \"{}\"\nArticle opening: \"{}\"",
            title,
            truncate_chars(body, 300)
        );
        match self.call_model(&prompt, "canonical_headline").await {
            Some((text, cost)) => Ok(Curated {
                value: Some(text),
                cost_usd: cost,
            }),
            None => Ok(Curated::free(None)),
        }
    }

    async fn check_relevance(&self, title: &str, body: &str) -> Result<Curated<Verdict>> {
        let prompt = format!(
            "You are a skeptical senior news editor. Decide whether the text \
             below is genuine news or promotional/marketing/clickbait content. \
             Reject low-value content; approve only relevant news. Answer with \
             exactly one word: APPROVED or REJECTED.\n\n\
             Headline: {}\nBody: {}",
            title,
            truncate_chars(body, 700)
        );
        match self.call_model(&prompt, "check_relevance").await {
            Some((text, cost)) => {
                let verdict = match text.as_str() {
                    "APPROVED" => Verdict::Approved,
                    "REJECTED" => Verdict::Rejected("REJECTED".to_string()),
                    other => {
                        // Unexpected answers fail closed.
                        warn!(answer = %other, "unexpected relevance verdict, rejecting");
                        Verdict::Rejected(format!("unexpected verdict: {}", other))
                    }
                };
                info!(title = %truncate_chars(title, 50), ?verdict, "relevance checked");
                Ok(Curated {
                    value: verdict,
                    cost_usd: cost,
                })
            }
            // No model available: let everything through instead of silently
            // rejecting the whole cycle.
            None => Ok(Curated::free(Verdict::Approved)),
        }
    }

    async fn translate(&self, text: &str, source_language: &str) -> Result<Curated<String>> {
        if text.is_empty() {
            return Ok(Curated::free(String::new()));
        }
        let prompt = format!(
            "Translate the following text from {} into Brazilian Portuguese, \
             keeping the meaning and the journalistic tone. Return only the \
             translated text:\n\n{}",
            source_language, text
        );
        match self.call_model(&prompt, "translate").await {
            Some((translated, cost)) => Ok(Curated {
                value: translated,
                cost_usd: cost,
            }),
            None => Ok(Curated::free(text.to_string())),
        }
    }

    async fn refine_title(&self, title: &str) -> Result<Curated<String>> {
        if title.is_empty() {
            return Ok(Curated::free(String::new()));
        }
        let prompt = format!(
            "Refine the news headline below so it reads clearly and \
             attractively, fixing odd punctuation. Return ONLY the refined \
             headline.\n\nHeadline: \"{}\"",
            title
        );
        match self.call_model(&prompt, "refine_title").await {
            Some((refined, cost)) => Ok(Curated {
                value: refined.replace('"', ""),
                cost_usd: cost,
            }),
            None => Ok(Curated::free(title.to_string())),
        }
    }

    async fn rewrite_caption(&self, body: &str) -> Result<Curated<String>> {
        if body.is_empty() {
            return Ok(Curated::free(String::new()));
        }
        let prompt = format!(
            "You are a senior copywriter for a news page. Turn the article \
             below into a magnetic, easy-to-read caption in Brazilian \
             Portuguese. Your answer must be EXACTLY: one summary paragraph \
             (100 words max), then the marker `|||`, then a short provocative \
             closing hook. Never use list markers such as '1.' or '-'.\n\n\
             Article:\n---\n{}\n---",
            body
        );
        match self.call_model(&prompt, "rewrite_caption").await {
            Some((text, cost)) => {
                let parts: Vec<&str> = text.splitn(2, "|||").collect();
                let formatted = if parts.len() == 2 {
                    format!(
                        "{}\n\n{}",
                        scrub_list_marker(parts[0].trim()),
                        scrub_list_marker(parts[1].trim())
                    )
                } else {
                    scrub_list_marker(text.trim()).to_string()
                };
                Ok(Curated {
                    value: formatted,
                    cost_usd: cost,
                })
            }
            None => Ok(Curated::free(body.to_string())),
        }
    }

    async fn categorize(&self, title: &str, body: &str) -> Result<Curated<String>> {
        let prompt = format!(
            "You classify news content. Read the headline and body and name one \
             concise, specific category of at most two words (examples: \
             'Fórmula 1', 'Inteligência Artificial', 'Cinema', 'Mercado \
             Financeiro'). Return ONLY the category name.\n\n\
             Headline: \"{}\"\nBody: \"{}\"",
            title,
            truncate_chars(body, 700)
        );
        match self.call_model(&prompt, "categorize").await {
            Some((category, cost)) => Ok(Curated {
                value: category,
                cost_usd: cost,
            }),
            None => Ok(Curated::free("Geral".to_string())),
        }
    }

    async fn hashtags(&self, seed: &str) -> Result<Curated<String>> {
        if seed.is_empty() {
            return Ok(Curated::free(String::new()));
        }
        let prompt = format!(
            "You do Instagram SEO. Read the text and produce the 3 most \
             relevant hashtags in Brazilian Portuguese. Avoid generic tags; \
             focus on the specific topics. Return ONLY the 3 hashtags separated \
             by spaces, each starting with #.\n\nText:\n---\n{}\n---",
            seed
        );
        match self.call_model(&prompt, "hashtags").await {
            Some((tags, cost)) => Ok(Curated {
                value: tags,
                cost_usd: cost,
            }),
            None => Ok(Curated::free(String::new())),
        }
    }

    async fn session_cost(&self) -> f64 {
        *self.session_cost.read().await
    }
}

// ---------------------------------------------------------------------------
// Mock implementation for tests
// ---------------------------------------------------------------------------

/// Deterministic curator: canonicalizes by normalizing the title, approves
/// everything unless told otherwise, and charges a fixed cost per call.
pub struct MockCurator {
    cost_per_call: f64,
    reject_containing: Option<String>,
    session_cost: Arc<RwLock<f64>>,
}

impl MockCurator {
    pub fn new() -> Self {
        Self {
            cost_per_call: 0.0,
            reject_containing: None,
            session_cost: Arc::new(RwLock::new(0.0)),
        }
    }

    pub fn with_cost(mut self, cost_per_call: f64) -> Self {
        self.cost_per_call = cost_per_call;
        self
    }

    /// Reject any article whose title contains `needle`.
    pub fn rejecting(mut self, needle: impl Into<String>) -> Self {
        self.reject_containing = Some(needle.into());
        self
    }

    async fn charge(&self) -> f64 {
        *self.session_cost.write().await += self.cost_per_call;
        self.cost_per_call
    }
}

impl Default for MockCurator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Curator for MockCurator {
    fn curator_name(&self) -> String {
        "mock".to_string()
    }

    async fn canonical_headline(
        &self,
        title: &str,
        _body: &str,
    ) -> Result<Curated<Option<String>>> {
        let cost = self.charge().await;
        Ok(Curated {
            value: Some(title.trim().to_lowercase()),
            cost_usd: cost,
        })
    }

    async fn check_relevance(&self, title: &str, _body: &str) -> Result<Curated<Verdict>> {
        let cost = self.charge().await;
        let verdict = match &self.reject_containing {
            Some(needle) if title.contains(needle.as_str()) => {
                Verdict::Rejected("REJECTED".to_string())
            }
            _ => Verdict::Approved,
        };
        Ok(Curated {
            value: verdict,
            cost_usd: cost,
        })
    }

    async fn translate(&self, text: &str, _source_language: &str) -> Result<Curated<String>> {
        let cost = self.charge().await;
        Ok(Curated {
            value: text.to_string(),
            cost_usd: cost,
        })
    }

    async fn refine_title(&self, title: &str) -> Result<Curated<String>> {
        let cost = self.charge().await;
        Ok(Curated {
            value: title.to_string(),
            cost_usd: cost,
        })
    }

    async fn rewrite_caption(&self, body: &str) -> Result<Curated<String>> {
        let cost = self.charge().await;
        Ok(Curated {
            value: body.to_string(),
            cost_usd: cost,
        })
    }

    async fn categorize(&self, _title: &str, _body: &str) -> Result<Curated<String>> {
        let cost = self.charge().await;
        Ok(Curated {
            value: "Geral".to_string(),
            cost_usd: cost,
        })
    }

    async fn hashtags(&self, _seed: &str) -> Result<Curated<String>> {
        let cost = self.charge().await;
        Ok(Curated {
            value: "#noticias #brasil #hoje".to_string(),
            cost_usd: cost,
        })
    }

    async fn session_cost(&self) -> f64 {
        *self.session_cost.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_removes_list_markers() {
        assert_eq!(scrub_list_marker("1. resumo"), "resumo");
        assert_eq!(scrub_list_marker("- resumo"), "resumo");
        assert_eq!(scrub_list_marker("* resumo"), "resumo");
        assert_eq!(scrub_list_marker("resumo"), "resumo");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("ação política", 4), "ação");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn mock_accumulates_session_cost() {
        let curator = MockCurator::new().with_cost(0.001);
        curator.refine_title("t").await.unwrap();
        curator.categorize("t", "b").await.unwrap();
        let cost = curator.session_cost().await;
        assert!((cost - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mock_rejects_configured_titles() {
        let curator = MockCurator::new().rejecting("PROMO");
        let verdict = curator.check_relevance("PROMO: buy now", "").await.unwrap();
        assert!(matches!(verdict.value, Verdict::Rejected(_)));
        let verdict = curator.check_relevance("Real news", "").await.unwrap();
        assert_eq!(verdict.value, Verdict::Approved);
    }
}
