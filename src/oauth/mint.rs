//! Access-token minting from the stored refresh token.

use super::{provider, FlowContext};
use crate::credentials::{CredentialCipher, CredentialRecord};
use crate::error::BrokerError;
use crate::identity::UserId;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Access token handed back to the caller, with the provider's declared lifetime.
#[derive(Serialize, Clone, PartialEq)]
pub struct MintedToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<Value>,
}

impl fmt::Debug for MintedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintedToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Mints a fresh access token for the caller from their stored refresh token.
///
/// The caller supplies no token material; the refresh token only ever comes
/// from the store.
pub struct TokenMintFlow {
    ctx: FlowContext,
}

impl TokenMintFlow {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }

    /// Runs the mint for the caller identified by `authorization`.
    ///
    /// # Flow
    /// 1. Configuration complete, else `Misconfigured`
    /// 2. Caller verified, else `Unauthorized`
    /// 3. Stored credential found, else `NoCredentials`
    /// 4. Refresh token decrypted, else `Cipher`
    /// 5. Refresh grant accepted, else `Provider` (store untouched)
    /// 6. Access token present, else `Provider("No access token")`
    /// 7. Rotated refresh token persisted, best-effort
    pub async fn run(&self, authorization: Option<&str>) -> Result<MintedToken, BrokerError> {
        let config = &self.ctx.config;
        config.ensure_complete()?;

        let user = self.ctx.authenticate(authorization).await?;

        let record = self
            .ctx
            .store
            .get_credential(user.as_str(), &config.provider)
            .await?
            .ok_or_else(|| {
                debug!(user_id = %user, provider = %config.provider, "No stored credential");
                BrokerError::NoCredentials
            })?;

        let cipher = CredentialCipher::from_secret(&config.encryption_secret)?;
        let refresh_token = cipher.decrypt(&record.refresh_token_cipher).map_err(|e| {
            warn!(user_id = %user, error = %e, "Stored refresh token could not be decrypted");
            BrokerError::Cipher(e)
        })?;

        let tokens = provider::refresh_access_token(&self.ctx.http, config, &refresh_token).await?;

        let access_token = tokens
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BrokerError::provider_message("No access token"))?;

        let rotated = match tokens.refresh_token.filter(|t| !t.is_empty()) {
            Some(new_refresh_token) => {
                self.persist_rotation(&cipher, &user, &new_refresh_token).await;
                true
            }
            None => false,
        };

        self.ctx.metrics.record_mint();
        info!(
            user_id = %user,
            provider = %config.provider,
            rotated = rotated,
            "Access token minted"
        );

        Ok(MintedToken {
            access_token,
            expires_in: tokens.expires_in,
        })
    }

    /// Overwrites the stored refresh token with the rotated one.
    ///
    /// The access token has already been issued, so a failure here is logged
    /// and counted but never fails the request.
    async fn persist_rotation(&self, cipher: &CredentialCipher, user: &UserId, new_refresh_token: &str) {
        let provider = &self.ctx.config.provider;

        let result = match cipher.encrypt(new_refresh_token) {
            Ok(encrypted) => {
                let record = CredentialRecord::new(user.as_str(), provider, encrypted);
                self.ctx.store.upsert_credential(&record).await
            }
            Err(e) => Err(BrokerError::Cipher(e)),
        };

        match result {
            Ok(()) => {
                self.ctx.metrics.record_rotation();
                debug!(user_id = %user, provider = %provider, "Rotated refresh token stored");
            }
            Err(e) => {
                self.ctx.metrics.record_rotation_persist_failure();
                warn!(
                    user_id = %user,
                    provider = %provider,
                    error = %e,
                    "Failed to persist rotated refresh token; stored credential is now stale"
                );
            }
        }
    }
}
