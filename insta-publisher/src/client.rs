use crate::session::Session;
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use interfaces::{PostContent, PublishError, PublishReceipt, Publisher};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

const INSTAGRAM_BASE_URL: &str = "https://graph.instagram.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct InstaClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    session_file: PathBuf,
    session: RwLock<Option<Session>>,
}

#[derive(Deserialize)]
struct Account {
    id: String,
    username: String,
}

#[derive(Serialize)]
struct MediaContainerRequest<'a> {
    image_url: &'a str,
    caption: &'a str,
    overlay: &'a interfaces::OverlayCard,
}

#[derive(Serialize)]
struct MediaPublishRequest<'a> {
    creation_id: &'a str,
}

#[derive(Deserialize)]
struct ObjectId {
    id: String,
}

impl InstaClient {
    pub fn new(access_token: Option<String>, session_file: PathBuf) -> Self {
        let client = Client::builder()
            .user_agent("news-aggregator/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: INSTAGRAM_BASE_URL.to_string(),
            access_token,
            session_file,
            session: RwLock::new(None),
        }
    }

    /// Point the client at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn token(&self) -> Result<&str, PublishError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| PublishError::Auth("no access token configured".to_string()))
    }

    /// Resolve the account behind the access token.
    async fn current_account(&self) -> Result<Account, PublishError> {
        let token = self.token()?;
        let url = format!("{}/me", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "id,username"), ("access_token", token)])
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body));
        }
        response
            .json::<Account>()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }

    /// POST a JSON payload, retrying transient failures, and decode an
    /// `{ "id": ... }` response.
    async fn post_for_id<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<String, PublishError> {
        let token = self.token()?;

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: RETRY_DELAY,
            initial_interval: RETRY_DELAY,
            max_interval: RETRY_DELAY * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(RETRY_DELAY * 30),
            ..Default::default()
        };

        let mut last_error = PublishError::Transport("request not attempted".to_string());

        for attempt in 0..=MAX_RETRIES {
            let result = self
                .client
                .post(url)
                .query(&[("access_token", token)])
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<ObjectId>()
                            .await
                            .map(|o| o.id)
                            .map_err(|e| PublishError::Transport(e.to_string()));
                    }
                    let text = response.text().await.unwrap_or_default();
                    let error = classify(status, &text);
                    // Auth and payload rejections won't heal on retry.
                    if !matches!(error, PublishError::Transport(_)) {
                        return Err(error);
                    }
                    last_error = error;
                }
                Err(e) => {
                    last_error = PublishError::Transport(e.to_string());
                }
            }

            if attempt < MAX_RETRIES {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(attempt = attempt + 1, ?delay, "retrying Instagram request");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        Err(last_error)
    }
}

/// Map an HTTP failure to the publish error taxonomy.
fn classify(status: reqwest::StatusCode, body: &str) -> PublishError {
    let detail = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {body}")
    };
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        PublishError::Auth(detail)
    } else if status.is_client_error() {
        PublishError::Rejected(detail)
    } else {
        PublishError::Transport(detail)
    }
}

#[async_trait]
impl Publisher for InstaClient {
    fn target_name(&self) -> &'static str {
        "instagram"
    }

    /// Validate the cached session, or resolve a fresh one from the token
    /// and rewrite the cache.
    async fn connect(&self) -> Result<(), PublishError> {
        if let Some(cached) = Session::load(&self.session_file) {
            match self.current_account().await {
                Ok(account) if account.id == cached.account_id => {
                    info!(username = %cached.username, "cached session revalidated");
                    *self.session.write().await = Some(cached);
                    return Ok(());
                }
                Ok(_) => {
                    warn!("cached session belongs to a different account, refreshing");
                }
                Err(e) => {
                    warn!(error = %e, "cached session failed validation, refreshing");
                }
            }
        }

        let account = self.current_account().await?;
        let session = Session::new(account.id, account.username);
        if let Err(e) = session.save(&self.session_file) {
            warn!(path = %self.session_file.display(), error = %e, "could not cache session");
        }
        info!(username = %session.username, "logged in, session cached");
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn publish(&self, post: &PostContent) -> Result<PublishReceipt, PublishError> {
        let account_id = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) => s.account_id.clone(),
                None => return Err(PublishError::NoSession),
            }
        };

        info!(image_url = %post.image_url, "creating media container");
        let container_url = format!("{}/{}/media", self.base_url, account_id);
        let creation_id = self
            .post_for_id(
                &container_url,
                &MediaContainerRequest {
                    image_url: &post.image_url,
                    caption: &post.caption,
                    overlay: &post.card,
                },
            )
            .await?;

        let publish_url = format!("{}/{}/media_publish", self.base_url, account_id);
        let media_id = self
            .post_for_id(
                &publish_url,
                &MediaPublishRequest {
                    creation_id: &creation_id,
                },
            )
            .await?;

        info!(%media_id, "photo published");
        Ok(PublishReceipt { media_id })
    }
}
