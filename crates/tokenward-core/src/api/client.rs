//! API client for the credential server and account endpoints.
//!
//! `ApiClient` implements `CredentialServer` over HTTP and offers JSON
//! helpers the request pipeline uses for business calls. It knows nothing
//! about sessions: tokens are passed in per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::server::{CredentialServer, IssuedSession, LoginCredentials, Registration};
use crate::auth::{AuthError, CredentialPair};
use crate::config::Config;
use crate::models::AccountSummary;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Body of a login, registration or renewal response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: String,
    /// Absent when the server does not rotate refresh tokens
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<AccountSummary>,
}

#[derive(Debug, Serialize)]
struct RenewRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Human-readable message from a JSON error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.detail))
        .unwrap_or_else(|| body.to_string())
}

fn issue_error(error: ApiError) -> AuthError {
    match error {
        ApiError::Unauthorized(body) | ApiError::NotFound(body)
            if body.contains("No account") =>
        {
            AuthError::AccountNotFound
        }
        ApiError::Unauthorized(_) | ApiError::BadRequest(_) => AuthError::InvalidCredentials,
        other => AuthError::ServiceUnavailable(other.to_string()),
    }
}

fn register_error(error: ApiError) -> AuthError {
    match error {
        ApiError::Conflict(_) => AuthError::AccountExists,
        ApiError::BadRequest(body) => AuthError::Rejected(error_message(&body)),
        other => AuthError::ServiceUnavailable(other.to_string()),
    }
}

fn renew_error(error: ApiError) -> AuthError {
    match error {
        ApiError::Unauthorized(body) | ApiError::BadRequest(body)
            if body.to_lowercase().contains("expired") =>
        {
            AuthError::RefreshTokenExpired
        }
        ApiError::Unauthorized(_) | ApiError::BadRequest(_) | ApiError::AccessDenied(_) => {
            AuthError::RefreshTokenInvalid
        }
        other => AuthError::ServiceUnavailable(other.to_string()),
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    login_path: String,
    register_path: String,
    renew_path: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login_path: config.login_path.clone(),
            register_path: config.register_path.clone(),
            renew_path: config.renew_path.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Whether `path` addresses the renewal endpoint.
    pub fn is_renewal_path(&self, path: &str) -> bool {
        let url = self.build_url(path);
        let url = url.split('?').next().unwrap_or(&url);
        url.trim_end_matches('/') == self.build_url(&self.renew_path).trim_end_matches('/')
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Like `check_response`, but Ok(None) for a rate limit (should retry).
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            Self::check_response(response).await.map(Some)
        }
    }

    async fn send_with_backoff(
        &self,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;
            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e)))
    }

    fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T, ApiError> {
        let url = self.build_url(path);
        let response = self
            .send_with_backoff(&url, || Self::authorize(self.client.get(&url), token))
            .await?;
        Self::parse_json(response, &url).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = self.build_url(path);
        let response = self
            .send_with_backoff(&url, || Self::authorize(self.client.post(&url).json(body), token))
            .await?;
        Self::parse_json(response, &url).await
    }

    /// Unauthenticated POST to a credential endpoint. Not retried on 429:
    /// the caller owns the retry budget for these.
    async fn post_for_tokens<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<TokenResponse, ApiError> {
        let url = self.build_url(path);
        debug!(url = %url, "Calling credential endpoint");
        let response = self.client.post(&url).json(body).send().await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, &url).await
    }
}

#[async_trait]
impl CredentialServer for ApiClient {
    async fn issue(&self, credentials: &LoginCredentials) -> Result<IssuedSession, AuthError> {
        let tokens = self
            .post_for_tokens(&self.login_path, credentials)
            .await
            .map_err(issue_error)?;
        let refresh = tokens
            .refresh
            .ok_or_else(|| AuthError::ServiceUnavailable("login response had no refresh token".into()))?;
        Ok(IssuedSession {
            pair: CredentialPair::new(tokens.access, refresh),
            account: tokens.user,
        })
    }

    async fn register(&self, registration: &Registration) -> Result<IssuedSession, AuthError> {
        let tokens = self
            .post_for_tokens(&self.register_path, registration)
            .await
            .map_err(register_error)?;
        let refresh = tokens.refresh.ok_or_else(|| {
            AuthError::ServiceUnavailable("registration response had no refresh token".into())
        })?;
        Ok(IssuedSession {
            pair: CredentialPair::new(tokens.access, refresh),
            account: tokens.user,
        })
    }

    async fn renew(&self, refresh_token: &str) -> Result<CredentialPair, AuthError> {
        let tokens = self
            .post_for_tokens(&self.renew_path, &RenewRequest { refresh: refresh_token })
            .await
            .map_err(renew_error)?;
        let refresh = tokens.refresh.unwrap_or_else(|| refresh_token.to_string());
        Ok(CredentialPair::new(tokens.access, refresh))
    }
}
