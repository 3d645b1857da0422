//! Image validation and overlay-card layout.
//!
//! Posts render on a 1080x1350 portrait canvas with a dark scrim and a text
//! block in the lower 40%. Layout is computed here, once, so the posting
//! target receives final wrapped lines and a chosen font size instead of
//! re-measuring text.

use crate::fetcher::Fetcher;
use crate::types::{AggregatorError, OverlayCard, Result};
use tracing::debug;

const CANVAS_W: u32 = 1080;
const CANVAS_H: u32 = 1350;
const MARGIN_LEFT: u32 = 110;
const MARGIN_RIGHT: u32 = 110;
const BOTTOM_PAD: u32 = 50;
/// Text block starts at 60% of the canvas height.
const TEXT_TOP: u32 = (CANVAS_H as u64 * 60 / 100) as u32;

const CATEGORY_FONT_PX: u32 = 32;
const CATEGORY_GAP_PX: u32 = 25;
const HEADLINE_FONT_MAX: u32 = 52;
const HEADLINE_FONT_MIN: u32 = 36;
const FONT_STEP: u32 = 2;
/// Inter-line leading, matching the renderer's default spacing.
const LINE_LEADING: u32 = 4;

/// Anything smaller is a tracking pixel or a broken placeholder.
const MIN_IMAGE_BYTES: usize = 1024;

/// Validate that an article image is usable as a post background:
/// reachable, actually an image, and within size bounds.
pub async fn probe_image(fetcher: &Fetcher, url: &str) -> Result<()> {
    let response = fetcher.client().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AggregatorError::General(format!(
            "image fetch returned HTTP {}",
            status
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(AggregatorError::General(format!(
            "not an image: content-type {}",
            if content_type.is_empty() { "missing" } else { &content_type }
        )));
    }

    let bytes = response.bytes().await?;
    if bytes.len() > fetcher.max_response_bytes() {
        return Err(AggregatorError::ResponseTooLarge { size: bytes.len() });
    }
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(AggregatorError::General(format!(
            "image too small: {} bytes",
            bytes.len()
        )));
    }

    debug!(%url, size = bytes.len(), "image validated");
    Ok(())
}

/// Lay out the overlay card for a headline.
///
/// Font size steps down from 52px until the wrapped headline fits the text
/// box; below the 36px floor the smallest size is kept and the box overflows
/// rather than shrinking further into illegibility.
pub fn compose_card(headline: &str, category: &str, opacity: f64) -> OverlayCard {
    let box_w = CANVAS_W - MARGIN_LEFT - MARGIN_RIGHT;
    let box_h = CANVAS_H - TEXT_TOP - BOTTOM_PAD;
    let headline_box_h = box_h - CATEGORY_FONT_PX - CATEGORY_GAP_PX;

    let mut font_px = HEADLINE_FONT_MAX;
    let mut lines = wrap_to_width(headline, chars_per_line(font_px, box_w));

    while font_px > HEADLINE_FONT_MIN {
        let height = lines.len() as u32 * (font_px + LINE_LEADING);
        if height <= headline_box_h {
            break;
        }
        font_px -= FONT_STEP;
        lines = wrap_to_width(headline, chars_per_line(font_px, box_w));
    }

    OverlayCard {
        opacity,
        category_tag: format!("#{}", category.to_uppercase()),
        headline_lines: lines,
        font_px,
    }
}

/// Approximate glyph advance for the headline face: 55% of the em size.
fn chars_per_line(font_px: u32, box_w: u32) -> usize {
    let char_w = (font_px * 11 / 20).max(1);
    (box_w / char_w).max(1) as usize
}

/// Greedy word wrap; words longer than the line are hard-split.
fn wrap_to_width(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(max_chars) {
                lines.push(chunk.iter().collect());
            }
            // Keep the last fragment open so short trailing words can join it.
            if let Some(last) = lines.pop() {
                current = last;
            }
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current.chars().count() + 1 + word_len
        };

        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
