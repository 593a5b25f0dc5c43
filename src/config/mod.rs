//! Broker configuration.
//!
//! Built once at process start (optional TOML file, then environment overrides)
//! and passed to the flows by `Arc`. Nothing below `main` reads the environment.

use crate::error::BrokerError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;

/// Complete broker configuration
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
    /// Data platform base URL (`SUPABASE_URL`)
    #[serde(default)]
    pub platform_url: String,

    /// Data platform privileged access key (`SUPABASE_SERVICE_ROLE_KEY`)
    #[serde(default)]
    pub service_role_key: String,

    /// Secret the refresh-token encryption key is derived from (`SYM_ENCRYPTION_KEY`)
    #[serde(default)]
    pub encryption_secret: String,

    /// OAuth client identifier (`GOOGLE_CLIENT_ID`)
    #[serde(default)]
    pub client_id: String,

    /// OAuth client secret (`GOOGLE_CLIENT_SECRET`)
    #[serde(default)]
    pub client_secret: String,

    /// Identity provider token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Provider tag stored with each credential
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite path; when set, credentials are kept locally instead of on the platform
    #[serde(default)]
    pub credentials_db: Option<String>,

    /// Timeout applied to every outbound request
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_provider() -> String {
    "google".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_http_timeout() -> u64 {
    15
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            platform_url: String::new(),
            service_role_key: String::new(),
            encryption_secret: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            token_url: default_token_url(),
            provider: default_provider(),
            bind_addr: default_bind_addr(),
            credentials_db: None,
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl BrokerConfig {
    /// Build from env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg
    }

    /// Overlays values from `lookup` (normally `std::env::var`).
    ///
    /// Unset variables leave the current value untouched; unparsable numbers
    /// are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut String, key: &str| {
            if let Some(v) = lookup(key) {
                *target = v;
            }
        };

        set(&mut self.platform_url, "SUPABASE_URL");
        set(&mut self.service_role_key, "SUPABASE_SERVICE_ROLE_KEY");
        set(&mut self.encryption_secret, "SYM_ENCRYPTION_KEY");
        set(&mut self.client_id, "GOOGLE_CLIENT_ID");
        set(&mut self.client_secret, "GOOGLE_CLIENT_SECRET");
        set(&mut self.token_url, "BROKER_TOKEN_URL");
        set(&mut self.provider, "BROKER_PROVIDER");
        set(&mut self.bind_addr, "BROKER_BIND_ADDR");

        if let Some(v) = lookup("BROKER_CREDENTIALS_DB") {
            self.credentials_db = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("BROKER_HTTP_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.http_timeout_seconds = n;
            }
        }
    }

    /// Names of required settings that are empty.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        [
            ("SUPABASE_URL", &self.platform_url),
            ("SUPABASE_SERVICE_ROLE_KEY", &self.service_role_key),
            ("SYM_ENCRYPTION_KEY", &self.encryption_secret),
            ("GOOGLE_CLIENT_ID", &self.client_id),
            ("GOOGLE_CLIENT_SECRET", &self.client_secret),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Fails with `Misconfigured` unless every required setting is present.
    pub fn ensure_complete(&self) -> Result<(), BrokerError> {
        if self.missing_settings().is_empty() {
            Ok(())
        } else {
            Err(BrokerError::Misconfigured)
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("BrokerConfig")
            .field("platform_url", &self.platform_url)
            .field("service_role_key", &redact(&self.service_role_key))
            .field("encryption_secret", &redact(&self.encryption_secret))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("token_url", &self.token_url)
            .field("provider", &self.provider)
            .field("bind_addr", &self.bind_addr)
            .field("credentials_db", &self.credentials_db)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .finish()
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BrokerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BrokerConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
