//! The two-phase token lifecycle.
//!
//! 1. [`TokenExchangeFlow`]: authorization code + PKCE verifier → refresh token,
//!    stored encrypted under (user, provider)
//! 2. [`TokenMintFlow`]: stored refresh token → short-lived access token,
//!    persisting a rotated refresh token when the provider issues one
//!
//! Both flows are stateless between requests; all state lives in the
//! [`CredentialStore`](crate::credentials::CredentialStore).

mod exchange;
mod mint;
pub mod provider;

pub use exchange::{ExchangeRequest, TokenExchangeFlow};
pub use mint::{MintedToken, TokenMintFlow};

use crate::auth::bearer_token;
use crate::config::BrokerConfig;
use crate::credentials::CredentialStore;
use crate::error::BrokerError;
use crate::identity::{IdentityVerifier, UserId};
use crate::metrics::BrokerMetrics;
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by both flows.
#[derive(Clone)]
pub struct FlowContext {
    pub config: Arc<BrokerConfig>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub store: Arc<dyn CredentialStore>,
    pub http: reqwest::Client,
    pub metrics: BrokerMetrics,
}

impl FlowContext {
    /// Resolves the caller from the raw `Authorization` header value.
    ///
    /// Any missing or rejected credential yields `Unauthorized`.
    async fn authenticate(&self, authorization: Option<&str>) -> Result<UserId, BrokerError> {
        let token = bearer_token(authorization).map_err(|e| {
            debug!(reason = %e, "Rejecting request without usable bearer token");
            self.metrics.record_unauthorized();
            BrokerError::Unauthorized
        })?;

        self.verifier.verify(&token).await.map_err(|_| {
            self.metrics.record_unauthorized();
            BrokerError::Unauthorized
        })
    }
}
