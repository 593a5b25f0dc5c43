//! Caller identity verification.
//!
//! The identity check is the only access-control gate of the broker. It runs
//! before any token-endpoint call and before any credential-store access.

use crate::error::BrokerError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// Stable internal identifier of an authenticated end user.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves a bearer credential to a user.
///
/// Every failure (invalid, expired, unknown, verifier unreachable) must surface
/// as `BrokerError::Unauthorized` so callers learn nothing about why.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<UserId, BrokerError>;
}

/// User payload returned by the platform's auth endpoint (only `id` is used).
#[derive(Deserialize)]
struct PlatformUser {
    #[serde(default)]
    id: String,
}

/// Verifies caller JWTs against the data platform's `/auth/v1/user` endpoint.
#[derive(Clone)]
pub struct PlatformIdentityVerifier {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl PlatformIdentityVerifier {
    pub fn new(client: reqwest::Client, base_url: &str, service_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for PlatformIdentityVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<UserId, BrokerError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| {
                debug!(error = %e, "Identity verification request failed");
                BrokerError::Unauthorized
            })?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Identity verification rejected");
            return Err(BrokerError::Unauthorized);
        }

        let user: PlatformUser = response.json().await.map_err(|e| {
            debug!(error = %e, "Identity verification returned unparsable user");
            BrokerError::Unauthorized
        })?;

        if user.id.is_empty() {
            return Err(BrokerError::Unauthorized);
        }

        Ok(UserId::new(user.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(url: &str) -> PlatformIdentityVerifier {
        PlatformIdentityVerifier::new(reqwest::Client::new(), url, "service-key")
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/v1/user")
            .match_header("authorization", "Bearer user-jwt")
            .match_header("apikey", "service-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"8d0fd2b3-user","email":"a@example.com","aud":"authenticated"}"#)
            .create_async()
            .await;

        let user = verifier(&server.url()).verify("user-jwt").await.unwrap();
        assert_eq!(user, UserId::new("8d0fd2b3-user"));
        assert_eq!(user.to_string(), "8d0fd2b3-user");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/auth/v1/user")
            .with_status(401)
            .with_body(r#"{"msg":"invalid JWT: token is expired"}"#)
            .create_async()
            .await;

        let result = verifier(&server.url()).verify("expired-jwt").await;
        assert_eq!(result, Err(BrokerError::Unauthorized));
    }

    #[tokio::test]
    async fn test_missing_user_id_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/auth/v1/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"email":"a@example.com"}"#)
            .create_async()
            .await;

        let result = verifier(&server.url()).verify("user-jwt").await;
        assert_eq!(result, Err(BrokerError::Unauthorized));
    }

    #[tokio::test]
    async fn test_unparsable_body_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/auth/v1/user")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let result = verifier(&server.url()).verify("user-jwt").await;
        assert_eq!(result, Err(BrokerError::Unauthorized));
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_unauthorized() {
        // Nothing listens on port 9
        let result = verifier("http://127.0.0.1:9").verify("user-jwt").await;
        assert_eq!(result, Err(BrokerError::Unauthorized));
    }
}
