//! Error taxonomy shared by both token flows.
//!
//! Variants carry no HTTP knowledge; the mapping to status codes and JSON
//! bodies happens in `api` at the request boundary.

use crate::credentials::CipherError;
use serde_json::Value;
use std::fmt;

/// Every way a broker request can fail.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// Missing or malformed caller input
    BadRequest(String),
    /// Bearer credential missing, malformed, invalid or expired
    Unauthorized,
    /// No stored credential for (user, provider)
    NoCredentials,
    /// Identity provider rejected the request or answered without a usable token
    Provider(Value),
    /// Stored ciphertext could not be decrypted (or a token could not be encrypted)
    Cipher(CipherError),
    /// Credential store failure
    Storage(String),
    /// Required server configuration is missing
    Misconfigured,
    /// Unexpected failure (e.g. the token endpoint could not be reached)
    Internal(String),
}

impl BrokerError {
    /// Provider failure carrying a plain message, e.g. "No access token".
    pub fn provider_message(message: &str) -> Self {
        BrokerError::Provider(Value::String(message.to_string()))
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::BadRequest(msg) => write!(f, "{}", msg),
            BrokerError::Unauthorized => write!(f, "Unauthorized"),
            BrokerError::NoCredentials => write!(f, "No credentials"),
            BrokerError::Provider(Value::String(msg)) => write!(f, "Provider error: {}", msg),
            BrokerError::Provider(payload) => write!(f, "Provider error: {}", payload),
            BrokerError::Cipher(e) => write!(f, "{}", e),
            BrokerError::Storage(msg) => write!(f, "Storage error: {}", msg),
            BrokerError::Misconfigured => write!(f, "Server misconfigured"),
            BrokerError::Internal(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Cipher(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CipherError> for BrokerError {
    fn from(e: CipherError) -> Self {
        BrokerError::Cipher(e)
    }
}
