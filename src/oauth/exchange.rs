//! Authorization-code exchange: obtain and store the refresh token.

use super::{provider, FlowContext};
use crate::credentials::{CredentialCipher, CredentialRecord};
use crate::error::BrokerError;
use serde::Deserialize;
use tracing::{debug, info};

/// Caller input for the exchange. All three fields are required and non-empty.
#[derive(Deserialize, Default, Clone)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

impl ExchangeRequest {
    pub fn new(code: &str, code_verifier: &str, redirect_uri: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            code_verifier: Some(code_verifier.to_string()),
            redirect_uri: Some(redirect_uri.to_string()),
        }
    }

    fn required(&self) -> Result<(&str, &str, &str), BrokerError> {
        match (
            non_empty(&self.code),
            non_empty(&self.code_verifier),
            non_empty(&self.redirect_uri),
        ) {
            (Some(code), Some(verifier), Some(redirect_uri)) => Ok((code, verifier, redirect_uri)),
            _ => Err(BrokerError::BadRequest("Missing parameters".to_string())),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Exchanges an authorization code for a refresh token and stores it encrypted.
///
/// No token material is returned: the access token from this grant is discarded.
/// Running the flow again for the same user replaces the stored refresh token.
pub struct TokenExchangeFlow {
    ctx: FlowContext,
}

impl TokenExchangeFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    /// Runs the exchange for the caller identified by `authorization`.
    ///
    /// # Flow
    /// 1. Configuration complete, else `Misconfigured`
    /// 2. Parameters present, else `BadRequest` (no network call made)
    /// 3. Caller verified, else `Unauthorized`
    /// 4. Code exchanged at the token endpoint (`Provider` on rejection)
    /// 5. Refresh token present, else `Provider("No refresh token returned")`
    /// 6. Refresh token encrypted and upserted (`Storage` on failure)
    pub async fn run(
        &self,
        authorization: Option<&str>,
        request: &ExchangeRequest,
    ) -> Result<(), BrokerError> {
        let config = &self.ctx.config;
        config.ensure_complete()?;

        let (code, code_verifier, redirect_uri) = request.required()?;

        let user = self.ctx.authenticate(authorization).await?;
        debug!(user_id = %user, "Exchange caller verified");

        let tokens = provider::exchange_code_for_token(
            &self.ctx.http,
            config,
            code,
            code_verifier,
            redirect_uri,
        )
        .await?;

        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BrokerError::provider_message("No refresh token returned"))?;

        let cipher = CredentialCipher::from_secret(&config.encryption_secret)?;
        let record = CredentialRecord::new(
            user.as_str(),
            &config.provider,
            cipher.encrypt(&refresh_token)?,
        );

        self.ctx.store.upsert_credential(&record).await?;
        self.ctx.metrics.record_exchange();

        info!(
            user_id = %user,
            provider = %config.provider,
            "Refresh token stored"
        );

        Ok(())
    }
}
