use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A normalized article pulled from a content source, before curation.
///
/// Every source integration maps its own payload shape into this struct;
/// downstream stages never see source-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image_url: Option<String>,
    /// Publisher-facing name of the outlet ("BBC News"), when the API gives one.
    pub source_name: Option<String>,
    /// Identifier of the integration that produced this item ("gnews").
    pub source_api: String,
    /// Two-letter language the item was fetched in.
    pub language: String,
    /// Category the item was fetched under.
    pub category: String,
}

/// Text card drawn over the background image of a post.
///
/// The canvas is the standard 1080x1350 portrait; the card carries only
/// layout decisions (wrapped lines, chosen font size, scrim opacity) so a
/// posting target can render it without re-measuring text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayCard {
    /// Dark scrim opacity in [0, 1].
    pub opacity: f64,
    /// Category tag line, e.g. "#TECHNOLOGY".
    pub category_tag: String,
    /// Headline, wrapped to the text box.
    pub headline_lines: Vec<String>,
    /// Headline font size in pixels.
    pub font_px: u32,
}

/// A fully rendered post, ready to hand to a posting target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostContent {
    pub image_url: String,
    pub caption: String,
    pub card: OverlayCard,
}

/// Returned by a posting target after a successful publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub media_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no valid session; call connect() first")]
    NoSession,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("post rejected by target: {0}")]
    Rejected(String),
}

/// Contract for a social-media posting target.
///
/// Implementations live in their own crate per target and hold whatever
/// session state the target requires.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Short name of the target, for status displays and logs.
    fn target_name(&self) -> &'static str;

    /// Establish (or revalidate) a session. Must succeed before `publish`.
    async fn connect(&self) -> Result<(), PublishError>;

    /// Whether a usable session is currently held.
    async fn is_connected(&self) -> bool;

    async fn publish(&self, post: &PostContent) -> Result<PublishReceipt, PublishError>;
}
