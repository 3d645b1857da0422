//! Durable pipeline configuration, stored as a JSON file next to the database.
//!
//! A missing or unreadable file yields `AppConfig::default()` so a fresh
//! checkout runs without setup; credentials stay empty until the operator
//! fills them in. Validation is separate from loading: the daemon refuses to
//! start on an invalid config, but one-shot commands can still inspect it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All durable settings consumed by the aggregator and the publish runner.
///
/// Every field has a default so any subset of keys can appear in the file.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Source integrations to poll ("gnews", "newsdata").
    pub enabled_sources: Vec<String>,
    /// Categories requested from each source.
    pub categories: Vec<String>,
    /// Two-letter languages to fetch in.
    pub languages: Vec<String>,
    /// Optional free-text queries fetched in addition to the categories.
    pub search_terms: Vec<String>,

    /// Dark scrim opacity for the overlay card, in [0, 1].
    pub overlay_opacity: f64,
    /// Minutes between fetch cycles. Must be positive.
    pub fetch_interval_minutes: u64,
    /// Minutes between publish ticks. Must be positive.
    pub post_interval_minutes: u64,
    /// Maximum successful posts per UTC day. 0 = uncapped.
    pub max_posts_per_day: u32,

    /// Account handle used in the caption prefix (without the "@").
    pub instagram_handle: String,
    pub instagram_access_token: String,
    pub gnews_api_key: String,
    pub newsdata_api_key: String,
    pub gemini_api_key: String,

    /// Where the posting target caches its resolved session.
    pub session_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enabled_sources: vec!["gnews".to_string()],
            categories: vec!["technology".to_string()],
            languages: vec!["pt".to_string()],
            search_terms: Vec::new(),
            overlay_opacity: 0.3,
            fetch_interval_minutes: 15,
            post_interval_minutes: 30,
            max_posts_per_day: 0,
            instagram_handle: String::new(),
            instagram_access_token: String::new(),
            gnews_api_key: String::new(),
            newsdata_api_key: String::new(),
            gemini_api_key: String::new(),
            session_file: PathBuf::from("session.json"),
        }
    }
}

/// Credentials are masked; everything else prints normally.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(s: &str) -> &'static str {
            if s.is_empty() {
                "<unset>"
            } else {
                "[REDACTED]"
            }
        }
        f.debug_struct("AppConfig")
            .field("enabled_sources", &self.enabled_sources)
            .field("categories", &self.categories)
            .field("languages", &self.languages)
            .field("search_terms", &self.search_terms)
            .field("overlay_opacity", &self.overlay_opacity)
            .field("fetch_interval_minutes", &self.fetch_interval_minutes)
            .field("post_interval_minutes", &self.post_interval_minutes)
            .field("max_posts_per_day", &self.max_posts_per_day)
            .field("instagram_handle", &self.instagram_handle)
            .field("instagram_access_token", &mask(&self.instagram_access_token))
            .field("gnews_api_key", &mask(&self.gnews_api_key))
            .field("newsdata_api_key", &mask(&self.newsdata_api_key))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("session_file", &self.session_file)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `path`.
    ///
    /// A missing file is the normal first-run case and yields defaults; a
    /// corrupt file also yields defaults (with a warning) rather than
    /// bricking the pipeline over a bad hand edit.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config unparsable, using defaults");
                Self::default()
            }
        }
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Enforce the config invariants: positive intervals, opacity in [0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "fetch_interval_minutes must be positive".to_string(),
            ));
        }
        if self.post_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "post_interval_minutes must be positive".to_string(),
            ));
        }
        if !self.overlay_opacity.is_finite()
            || self.overlay_opacity < 0.0
            || self.overlay_opacity > 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "overlay_opacity must be in [0, 1], got {}",
                self.overlay_opacity
            )));
        }
        Ok(())
    }

    /// Empty credential strings mean "not configured".
    pub fn optional(value: &str) -> Option<&str> {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    }
}
