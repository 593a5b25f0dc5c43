//! Credential store backed by the data platform's REST table API.
//!
//! Reads filter `secure_credentials` by `owner_user_id` and `provider`; writes
//! POST with `on_conflict=owner_user_id,provider` and merge-duplicates resolution,
//! so the platform's unique constraint performs the upsert atomically.

use super::{CredentialRecord, CredentialStore};
use crate::error::BrokerError;
use async_trait::async_trait;
use tracing::debug;

const TABLE: &str = "secure_credentials";

/// REST client for the `secure_credentials` table.
#[derive(Clone)]
pub struct PlatformCredentialStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl PlatformCredentialStore {
    /// # Arguments
    /// * `client` - Shared HTTP client (carries the request timeout)
    /// * `base_url` - Data platform base URL
    /// * `service_key` - Privileged access key
    pub fn new(client: reqwest::Client, base_url: &str, service_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, TABLE)
    }

    async fn error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        format!("status {}: {}", status, body)
    }
}

#[async_trait]
impl CredentialStore for PlatformCredentialStore {
    async fn get_credential(
        &self,
        owner_user_id: &str,
        provider: &str,
    ) -> Result<Option<CredentialRecord>, BrokerError> {
        debug!(owner_user_id = %owner_user_id, provider = %provider, "Fetching stored credential");

        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("select", "owner_user_id,provider,refresh_token_cipher".to_string()),
                ("owner_user_id", format!("eq.{}", owner_user_id)),
                ("provider", format!("eq.{}", provider)),
            ])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BrokerError::Storage(format!("Credential lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BrokerError::Storage(format!(
                "Credential lookup failed with {}",
                Self::error_body(response).await
            )));
        }

        let rows: Vec<CredentialRecord> = response.json().await.map_err(|e| {
            BrokerError::Storage(format!("Failed to parse credential lookup response: {}", e))
        })?;

        Ok(rows.into_iter().next())
    }

    async fn upsert_credential(&self, record: &CredentialRecord) -> Result<(), BrokerError> {
        debug!(
            owner_user_id = %record.owner_user_id,
            provider = %record.provider,
            "Upserting stored credential"
        );

        let response = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "owner_user_id,provider")])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(record)
            .send()
            .await
            .map_err(|e| BrokerError::Storage(format!("Credential upsert failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BrokerError::Storage(format!(
                "Credential upsert failed with {}",
                Self::error_body(response).await
            )));
        }

        Ok(())
    }
}
