//! Page fetcher: HTTP GET with gzip handling, timeout and bounded retries.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use harvest_shared::{FetchConfig, HarvestError, Result};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

/// Retrieves raw markup for a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Outcome of a single attempt that did not produce a body.
enum AttemptError {
    /// Worth retrying: transport failure, timeout, 429, 5xx.
    Transient(HarvestError),
    /// Retrying will not help.
    Fatal(HarvestError),
}

/// [`Fetcher`] backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build the HTTP client. Fails only if TLS setup fails.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Delay before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.config.retry_backoff.saturating_mul(factor)
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()
            .await
            .map_err(|e| AttemptError::Transient(HarvestError::Network(format!("{url}: {e}"))))?;

        let status = response.status();
        if !status.is_success() {
            let err = HarvestError::Network(format!("{url}: HTTP {status}"));
            return Err(if is_transient_status(status) {
                AttemptError::Transient(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"));

        let bytes = response.bytes().await.map_err(|e| {
            AttemptError::Transient(HarvestError::Network(format!("{url}: body read failed: {e}")))
        })?;

        decode_body(&bytes, gzipped)
            .map_err(|e| AttemptError::Fatal(HarvestError::Network(format!("{url}: {e}"))))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            debug!(attempt, "fetching");
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Transient(e)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Transient(e) | AttemptError::Fatal(e)) => return Err(e),
            }
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Body bytes as text, gunzipping first when the response says so.
fn decode_body(bytes: &[u8], gzipped: bool) -> std::io::Result<String> {
    if !gzipped {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }
    let mut decoder = GzDecoder::new(bytes);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
