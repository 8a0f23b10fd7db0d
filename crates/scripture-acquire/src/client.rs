use crate::build_id::{discover_build_id, BuildIdError};
use crate::engine::RunContext;
use crate::limiter::RateLimiter;
use crate::policy::FetchPolicy;
use crate::transport::{Transport, TransportResponse};
use crate::CancelSignal;
use chrono::Utc;
use scripture_model::{Canon, ChapterRef, FailureKind, RawChapterPayload, VersionConfig};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://www.bible.com";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transient: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("cancelled before the request was issued")]
    Cancelled,
}

impl FetchError {
    fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Report classification. `None` for cancellation, which is not a
    /// chapter failure.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            FetchError::Transient { .. } => Some(FailureKind::Transient),
            FetchError::NotFound(_) => Some(FailureKind::NotFound),
            FetchError::Malformed(_) => Some(FailureKind::Malformed),
            FetchError::Cancelled => None,
        }
    }
}

/// Client for the paginated content service.
///
/// Every request goes through the run's `RateLimiter`; transient failures are
/// retried with exponential backoff up to `FetchPolicy::max_attempts`.
/// Performs network I/O only.
#[derive(Debug)]
pub struct ContentClient<T> {
    transport: T,
    base_url: String,
    route: String,
    policy: FetchPolicy,
}

impl<T: Transport> ContentClient<T> {
    pub fn new(transport: T, policy: FetchPolicy) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            route: "bible".to_string(),
            policy,
        }
    }

    /// Point at a different host (mirrors, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Endpoint route segment: `bible` or `audio-bible`.
    pub fn with_route(mut self, route: &str) -> Self {
        self.route = route.to_string();
        self
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    /// Build the data URL for one chapter:
    /// `{base}/_next/data/{build}/{locale}/{route}/{version_id}/{BOOK}.{ch}.{CODE}.json`.
    pub fn chapter_url(&self, chapter: &ChapterRef, config: &VersionConfig) -> String {
        let usfm = chapter.usfm(&config.version_code);
        format!(
            "{}/_next/data/{}/{}/{}/{}/{usfm}.json?versionId={}&usfm={usfm}",
            self.base_url,
            config.build_id,
            config.locale,
            self.route,
            config.version_id,
            config.version_id,
        )
    }

    pub fn version_metadata_url(&self, version_id: &str) -> String {
        format!("{}/api/bible/version/{version_id}", self.base_url)
    }

    /// Public reader page for the edition's first chapter. Its HTML carries
    /// the current build id.
    pub fn sample_page_url(&self, version_id: &str, version_code: &str) -> String {
        format!("{}/{}/{version_id}/GEN.1.{version_code}", self.base_url, self.route)
    }

    /// Read the current build id off the edition's sample page.
    pub async fn discover_build_id(
        &self,
        version_id: &str,
        version_code: &str,
    ) -> Result<String, BuildIdError> {
        let url = self.sample_page_url(version_id, version_code);
        discover_build_id(&self.transport, &url, self.policy.request_timeout).await
    }

    /// Fetch a chapter, retrying transient failures with backoff. NotFound and
    /// Malformed are returned immediately; the caller decides whether a
    /// malformed chapter deserves another try.
    pub async fn fetch(
        &self,
        chapter: &ChapterRef,
        ctx: &RunContext,
    ) -> Result<RawChapterPayload, FetchError> {
        let mut attempt = 0;
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            attempt += 1;

            match self.fetch_once(chapter, ctx).await {
                Err(FetchError::Transient { message, retry_after })
                    if attempt < self.policy.max_attempts =>
                {
                    let delay = self
                        .policy
                        .backoff(attempt)
                        .max(retry_after.unwrap_or_default())
                        .min(self.policy.max_backoff);
                    tracing::warn!(
                        chapter = %chapter,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{message}; retrying"
                    );
                    if !ctx.cancel.sleep(delay).await {
                        return Err(FetchError::Cancelled);
                    }
                }
                Err(FetchError::Transient { message, .. }) => {
                    return Err(FetchError::Transient {
                        message: format!("{message} (gave up after {attempt} attempts)"),
                        retry_after: None,
                    });
                }
                other => return other,
            }
        }
    }

    /// A single request for a chapter, no retries.
    pub async fn fetch_once(
        &self,
        chapter: &ChapterRef,
        ctx: &RunContext,
    ) -> Result<RawChapterPayload, FetchError> {
        let url = self.chapter_url(chapter, &ctx.config);
        let response = self.get(&url, &ctx.limiter, &ctx.cancel).await?;
        let body = classify(response)?;
        tracing::debug!(chapter = %chapter, bytes = body.len(), "Received chapter");
        Ok(RawChapterPayload {
            chapter: chapter.clone(),
            body,
            fetched_at: Utc::now(),
        })
    }

    /// Build an edition-exact canon from the service's version metadata.
    pub async fn fetch_canon(&self, ctx: &RunContext) -> anyhow::Result<Canon> {
        let url = self.version_metadata_url(&ctx.config.version_id);
        tracing::info!(url = %url, "Fetching book/chapter list");

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.get(&url, &ctx.limiter, &ctx.cancel).await {
                Ok(r) if r.status >= 200 && r.status < 300 => break r,
                Ok(r) if attempt < self.policy.max_attempts && is_transient_status(r.status) => {
                    tracing::warn!(
                        status = r.status,
                        attempt,
                        "Version metadata unavailable; retrying"
                    );
                }
                Ok(r) => anyhow::bail!(
                    "HTTP {} for {url}; double-check version id {}",
                    r.status,
                    ctx.config.version_id
                ),
                Err(FetchError::Transient { message, .. })
                    if attempt < self.policy.max_attempts =>
                {
                    tracing::warn!(attempt, "{message}; retrying");
                }
                Err(e) => return Err(e.into()),
            }
            if !ctx.cancel.sleep(self.policy.backoff(attempt)).await {
                return Err(FetchError::Cancelled.into());
            }
        };

        let metadata: serde_json::Value = serde_json::from_str(&response.body)?;
        let name = format!("{}-{}", ctx.config.version_code, ctx.config.version_id);
        let canon = Canon::from_version_metadata(&name, &metadata)?;
        tracing::info!(
            books = canon.books.len(),
            chapters = canon.total_chapters(),
            "Resolved edition canon"
        );
        Ok(canon)
    }

    async fn get(
        &self,
        url: &str,
        limiter: &RateLimiter,
        cancel: &CancelSignal,
    ) -> Result<TransportResponse, FetchError> {
        let _permit = tokio::select! {
            permit = limiter.acquire() => permit.map_err(|_| FetchError::Cancelled)?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };
        tracing::trace!(url = %url, "GET");
        self.transport
            .get(url, self.policy.request_timeout)
            .await
            .map_err(|e| FetchError::transient(e.to_string()))
    }
}

#[cfg(test)]
impl ContentClient<crate::testing::ScriptedTransport> {
    pub(crate) fn transport_requests(&self, key: &str) -> usize {
        self.transport.requests(key)
    }

    pub(crate) fn transport_total(&self) -> usize {
        self.transport.total_requests()
    }
}

fn is_transient_status(status: u16) -> bool {
    matches!(status, 403 | 408 | 425 | 429) || (500..600).contains(&status)
}

/// Map an HTTP response onto the failure taxonomy, returning the body of
/// usable chapter responses.
fn classify(response: TransportResponse) -> Result<String, FetchError> {
    let status = response.status;
    match status {
        200..=299 => {}
        404 | 410 => return Err(FetchError::NotFound(format!("HTTP {status}"))),
        s if is_transient_status(s) => {
            return Err(FetchError::Transient {
                message: format!("HTTP {status}"),
                retry_after: response.retry_after,
            })
        }
        _ => return Err(FetchError::Malformed(format!("unexpected HTTP {status}"))),
    }

    // Throttling and interstitial pages come back as 200 with HTML.
    let json: serde_json::Value = serde_json::from_str(&response.body)
        .map_err(|e| FetchError::Malformed(format!("response is not JSON: {e}")))?;
    if json.pointer("/pageProps/notFound").and_then(|v| v.as_bool()) == Some(true)
        || json.get("notFound").and_then(|v| v.as_bool()) == Some(true)
    {
        return Err(FetchError::NotFound("service reported notFound".into()));
    }
    Ok(response.body)
}
