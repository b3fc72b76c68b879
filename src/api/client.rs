//! HTTP client for the candidate pipeline REST API.
//!
//! The remote service exposes a single collection resource. [`ApiClient`]
//! wraps a shared reqwest client and implements [`CandidateApi`], the
//! transport capability consumed by the cache service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::models::Candidate;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Transport capability for the candidate collection endpoint.
///
/// The cache service is generic over this trait so tests can substitute an
/// in-memory implementation for the real HTTP client.
#[async_trait]
pub trait CandidateApi: Send + Sync {
    /// Fetch the full candidate collection
    async fn list_candidates(&self) -> Result<Vec<Candidate>>;

    /// Delete the candidate with the given id
    async fn delete_candidate(&self, id: u64) -> Result<()>;

    /// Send a partial update carrying the given candidate's fields
    async fn patch_candidate(&self, candidate: &Candidate) -> Result<()>;
}

/// API client for the candidate pipeline service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn candidates_url(&self) -> String {
        format!("{}/candidates", self.base_url)
    }

    fn candidate_url(&self, id: u64) -> String {
        format!("{}/candidates/{}", self.base_url, id)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    /// Send a request, retrying rate-limited responses with exponential
    /// backoff. `build` is invoked once per attempt since request builders
    /// are consumed on send.
    async fn execute<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await.context("Failed to send request")?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl CandidateApi for ApiClient {
    async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let url = self.candidates_url();
        let response = self
            .execute(|| self.client.get(&url))
            .await
            .with_context(|| format!("Failed to fetch candidate list from {}", url))?;

        let text = response
            .text()
            .await
            .context("Failed to read candidate list body")?;
        let candidates: Vec<Candidate> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse candidate list from {}", url))?;

        debug!(count = candidates.len(), "Candidate list fetched");
        Ok(candidates)
    }

    async fn delete_candidate(&self, id: u64) -> Result<()> {
        let url = self.candidate_url(id);
        self.execute(|| self.client.delete(&url))
            .await
            .with_context(|| format!("Failed to delete candidate via {}", url))?;

        debug!(id, "Candidate deleted");
        Ok(())
    }

    async fn patch_candidate(&self, candidate: &Candidate) -> Result<()> {
        let url = self.candidate_url(candidate.id);
        self.execute(|| self.client.patch(&url).json(candidate))
            .await
            .with_context(|| format!("Failed to patch candidate via {}", url))?;

        debug!(id = candidate.id, "Candidate patched");
        Ok(())
    }
}
