//! Cached Instagram session.
//!
//! The resolved account is cached on disk so restarts skip the account
//! lookup when the token still works. The cache is advisory: it is always
//! revalidated against the API before use, and rewritten when stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub account_id: String,
    pub username: String,
    pub cached_at: DateTime<Utc>,
}

impl Session {
    pub fn new(account_id: String, username: String) -> Self {
        Self {
            account_id,
            username,
            cached_at: Utc::now(),
        }
    }

    /// Read a cached session. Missing or corrupt files mean "no session".
    pub fn load(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no cached session");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cached session unreadable");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}
