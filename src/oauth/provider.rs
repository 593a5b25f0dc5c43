//! Identity provider token endpoint client.
//!
//! Both grants POST form data to the configured token URL with the server-held
//! client credentials. Calls are single-shot: no retry on any failure.

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

/// OAuth token response. Every field is optional; the flows decide what is required.
///
/// Only the two tokens are type-checked. `expires_in` is kept as the raw JSON
/// value so it reaches the caller unmodified, and any other field is ignored.
#[derive(Deserialize, Default)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<Value>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Exchange an authorization code (plus PKCE verifier) for tokens.
///
/// # Errors
/// * `Provider` - Non-success status (payload is the provider's JSON error body,
///   or `{"error":"token exchange failed"}`) or an unparsable success body
/// * `Internal` - The token endpoint could not be reached
pub async fn exchange_code_for_token(
    client: &reqwest::Client,
    config: &BrokerConfig,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<TokenResponse, BrokerError> {
    let form = [
        ("code", code),
        ("code_verifier", code_verifier),
        ("redirect_uri", redirect_uri),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("grant_type", "authorization_code"),
    ];

    debug!(token_url = %config.token_url, "Exchanging authorization code");
    request_token(client, &config.token_url, &form, "token exchange failed").await
}

/// Exchange a refresh token for a new access token.
///
/// Same error contract as [`exchange_code_for_token`], with
/// `{"error":"token mint failed"}` as the fallback payload.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &BrokerConfig,
    refresh_token: &str,
) -> Result<TokenResponse, BrokerError> {
    let form = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    debug!(token_url = %config.token_url, "Refreshing access token");
    request_token(client, &config.token_url, &form, "token mint failed").await
}

async fn request_token(
    client: &reqwest::Client,
    token_url: &str,
    form: &[(&str, &str)],
    fallback_error: &str,
) -> Result<TokenResponse, BrokerError> {
    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await
        .map_err(|e| BrokerError::Internal(format!("Token endpoint request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&body)
            .unwrap_or_else(|_| json!({ "error": fallback_error }));
        debug!(status = %status, "Token endpoint rejected request");
        return Err(BrokerError::Provider(payload));
    }

    let token_response: TokenResponse = response.json().await.map_err(|e| {
        debug!(error = %e, "Token endpoint returned unparsable body");
        BrokerError::Provider(json!({ "error": "invalid token response" }))
    })?;

    debug!(
        has_access_token = token_response.access_token.is_some(),
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token endpoint responded"
    );

    Ok(token_response)
}
