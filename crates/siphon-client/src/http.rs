use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::Value;
use siphon_core::config::{HttpConfig, RateLimitConfig};
use siphon_core::error::HarvestError;
use siphon_core::rate_limit::RateLimitState;
use siphon_core::retry::{classify, RetryPolicy, StatusClass};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Immutable HTTP client shared by every fetch of a run.
///
/// Headers, including the bearer token, are fixed when the client is built.
/// Cloning is cheap: the underlying `reqwest::Client` is reference counted.
///
/// Every request goes through [`ApiClient::execute`], which layers the
/// rate-limit governor and the retry wrapper over a single send:
///
/// - 429 sleeps until the server's reset hint (or a fixed fallback) and
///   reissues the identical request without spending an attempt
/// - 403, 408, 5xx and network errors back off linearly and retry, up to
///   `max_retries` attempts
/// - 401 fails with `HarvestError::Authentication`
/// - anything else fails immediately
///
/// # Examples
///
/// ```no_run
/// use siphon_client::ApiClient;
/// use siphon_core::HttpConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::builder(HttpConfig::default())
///     .bearer("token")
///     .build()?;
/// let body = client.get_json("https://api.x.com/2/tweets/search/recent?query=rust".parse()?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    retry: RetryPolicy,
    rate_limit: RateLimitConfig,
    timeout: Duration,
}

/// Collects the settings of an [`ApiClient`] before it is frozen.
#[derive(Debug)]
pub struct ApiClientBuilder {
    http: HttpConfig,
    rate_limit: RateLimitConfig,
    bearer: Option<String>,
    headers: Vec<(String, String)>,
}

impl ApiClientBuilder {
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Adds a default header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Config` if a header is malformed or the HTTP
    /// client cannot be built.
    pub fn build(self) -> Result<ApiClient, HarvestError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HarvestError::Config(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HarvestError::Config(format!("invalid header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }
        if let Some(token) = &self.bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| HarvestError::Config("bearer token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(self.http.user_agent.clone())
            .connect_timeout(self.http.timeout)
            .read_timeout(self.http.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| HarvestError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(ApiClient {
            client,
            retry: RetryPolicy::from(&self.http),
            rate_limit: self.rate_limit,
            timeout: self.http.timeout,
        })
    }
}

impl ApiClient {
    pub fn builder(http: HttpConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            http,
            rate_limit: RateLimitConfig::default(),
            bearer: None,
            headers: Vec::new(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Whole-request bound for bodies read into memory. Streamed downloads
    /// are only bounded by the connect and per-read timeouts.
    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends the request built by `make`, governed by rate limiting and retries.
    ///
    /// `make` is called once per send so the identical request can be reissued.
    /// Only a response whose status equals `expected` counts as success.
    ///
    /// # Errors
    ///
    /// - `HarvestError::Authentication` on 401
    /// - `HarvestError::Http` on a non-retryable status
    /// - `HarvestError::RetriesExhausted` once `max_retries` attempts failed
    /// - `HarvestError::RateLimited` if the reset wait exceeds `max_wait`
    pub async fn execute<F>(&self, expected: u16, make: F) -> Result<Response, HarvestError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            let last_error = match make(&self.client).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    match classify(status, expected) {
                        StatusClass::Success => return Ok(resp),
                        StatusClass::Throttled => {
                            let state = RateLimitState::from_headers(resp.headers().iter().filter_map(
                                |(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)),
                            ));
                            let wait = state.wait(Utc::now().timestamp(), &self.rate_limit)?;
                            warn!(
                                url = %resp.url(),
                                wait_secs = wait.as_secs_f64(),
                                reset_hint = ?state.reset_at,
                                "Rate limit exceeded, waiting before reissuing request"
                            );
                            sleep(wait).await;
                            continue;
                        }
                        StatusClass::Unauthorized => {
                            return Err(HarvestError::Authentication(format!(
                                "HTTP 401 from {}",
                                resp.url()
                            )));
                        }
                        StatusClass::Transient => HarvestError::Http {
                            status,
                            url: resp.url().to_string(),
                        },
                        StatusClass::Terminal => {
                            let url = resp.url().to_string();
                            let body = resp.text().await.unwrap_or_default();
                            debug!(status, %url, body = %truncate(&body, 500), "Non-retryable response");
                            return Err(HarvestError::Http { status, url });
                        }
                    }
                }
                Err(e) => self.map_send_error(e),
            };

            attempt += 1;
            warn!(
                attempt,
                max_retries = self.retry.max_retries,
                error = %last_error,
                "Request failed"
            );
            if !self.retry.allows_another(attempt) {
                return Err(HarvestError::RetriesExhausted {
                    attempts: attempt,
                    last: last_error.to_string(),
                });
            }
            sleep(self.retry.delay_for(attempt)).await;
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> HarvestError {
        if e.is_timeout() {
            HarvestError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            HarvestError::Network(format!("Connection failed: {}", e))
        } else {
            HarvestError::Network(e.to_string())
        }
    }

    /// GETs `url` and parses the 200 body as JSON.
    pub async fn get_json(&self, url: Url) -> Result<Value, HarvestError> {
        let resp = self
            .execute(200, |c| c.get(url.clone()).timeout(self.timeout))
            .await?;
        parse_json(resp).await
    }

    /// POSTs `body` as JSON to `url` and parses the 200 body as JSON.
    pub async fn post_json<B>(&self, url: Url, body: &B) -> Result<Value, HarvestError>
    where
        B: Serialize + ?Sized,
    {
        let resp = self
            .execute(200, |c| c.post(url.clone()).json(body).timeout(self.timeout))
            .await?;
        parse_json(resp).await
    }

    /// GETs `url` and returns the 200 body as text.
    pub async fn get_text(&self, url: Url) -> Result<String, HarvestError> {
        let resp = self
            .execute(200, |c| c.get(url.clone()).timeout(self.timeout))
            .await?;
        resp.text()
            .await
            .map_err(|e| HarvestError::Network(format!("failed to read body: {}", e)))
    }
}

async fn parse_json(resp: Response) -> Result<Value, HarvestError> {
    let url = resp.url().to_string();
    resp.json()
        .await
        .map_err(|e| HarvestError::PayloadShape(format!("invalid JSON from {}: {}", url, e)))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Parses `base` and joins `path` onto it.
pub fn endpoint(base: &str, path: &str) -> Result<Url, HarvestError> {
    let base = Url::parse(base).map_err(|_| HarvestError::InvalidUrl(base.to_string()))?;
    base.join(path)
        .map_err(|e| HarvestError::InvalidUrl(format!("{}{}: {}", base, path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_bearer_and_headers() {
        let client = ApiClient::builder(HttpConfig::default())
            .bearer("abc")
            .header("Referer", "https://www.tiktok.com/")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_rejects_bad_header() {
        let err = ApiClient::builder(HttpConfig::default())
            .header("bad header", "x")
            .build()
            .unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_endpoint_join() {
        let url = endpoint("https://open.tiktokapis.com", "v2/oauth/token/").unwrap();
        assert_eq!(url.as_str(), "https://open.tiktokapis.com/v2/oauth/token/");
        assert!(matches!(
            endpoint("not a url", "x"),
            Err(HarvestError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let client = ApiClient::builder(HttpConfig {
            max_retries: 5,
            retry_base_delay: Duration::from_millis(10),
            ..HttpConfig::default()
        })
        .build()
        .unwrap();
        assert_eq!(client.retry_policy().max_retries, 5);
        assert_eq!(client.retry_policy().delay_for(2), Duration::from_millis(20));
    }
}
