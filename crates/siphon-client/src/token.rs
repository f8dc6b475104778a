use reqwest::Url;
use serde_json::Value;
use siphon_core::error::HarvestError;
use siphon_core::models::AccessToken;
use tracing::{info, instrument};

use crate::http::{endpoint, ApiClient};

/// Static client credentials for a client-credentials token exchange.
#[derive(Clone)]
pub struct Credentials {
    pub client_key: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_key: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_key", &self.client_key)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Exchanges client credentials for a short-lived bearer token.
///
/// # Examples
///
/// ```no_run
/// use siphon_client::{ApiClient, Credentials, TokenProvider};
/// use siphon_core::HttpConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let http = ApiClient::builder(HttpConfig::default()).build()?;
/// let provider = TokenProvider::new(http, "https://open.tiktokapis.com")?;
/// let token = provider.fetch(&Credentials::new("key", "secret")).await?;
/// println!("expires in {:?}s", token.expires_in);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TokenProvider {
    http: ApiClient,
    token_url: Url,
}

impl TokenProvider {
    /// Creates a provider posting to `<base_url>/v2/oauth/token/`.
    pub fn new(http: ApiClient, base_url: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            http,
            token_url: endpoint(base_url, "v2/oauth/token/")?,
        })
    }

    /// POSTs the form-encoded credentials and reads the token from the body.
    ///
    /// # Errors
    ///
    /// Any failure, including a missing `access_token` field, is reported as
    /// `HarvestError::Authentication`; callers must not proceed to fetch.
    #[instrument(skip_all, fields(url = %self.token_url))]
    pub async fn fetch(&self, credentials: &Credentials) -> Result<AccessToken, HarvestError> {
        let form = [
            ("client_key", credentials.client_key.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let resp = self
            .http
            .execute(200, |c| {
                c.post(self.token_url.clone())
                    .form(&form)
                    .timeout(self.http.request_timeout())
            })
            .await
            .map_err(|e| match e {
                HarvestError::Authentication(msg) => HarvestError::Authentication(msg),
                other => HarvestError::Authentication(other.to_string()),
            })?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| HarvestError::Authentication(format!("token response is not JSON: {}", e)))?;

        let token = parse_token(body)?;
        info!(
            expires_in = ?token.expires_in,
            token_type = ?token.token_type,
            "Access token acquired"
        );
        Ok(token)
    }
}

/// Reads an [`AccessToken`] out of a token endpoint response body.
pub fn parse_token(body: Value) -> Result<AccessToken, HarvestError> {
    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            let reason = body
                .get("error_description")
                .or_else(|| body.get("error"))
                .map(|v| v.to_string())
                .unwrap_or_else(|| "no access_token in response".to_string());
            HarvestError::Authentication(reason)
        })?
        .to_string();

    Ok(AccessToken {
        access_token,
        expires_in: body.get("expires_in").and_then(Value::as_u64),
        token_type: body
            .get("token_type")
            .and_then(Value::as_str)
            .map(str::to_string),
        raw: body,
    })
}
