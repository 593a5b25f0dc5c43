//! Encrypted refresh-token storage.
//!
//! Exactly one record exists per (`owner_user_id`, `provider`) pair. Writes are
//! upserts on that composite key, so callers never check for existence first.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Token flows (exchange / mint)     │
//! └─────────────────────────────────────────┘
//!          ↓ encrypt            ↑ decrypt
//! ┌─────────────────────────────────────────┐
//! │       CredentialCipher                  │
//! │  - SHA-256(secret) → AES-256-GCM key    │
//! │  - random nonce per call                │
//! └─────────────────────────────────────────┘
//!          ↓ upsert             ↑ get
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                   │
//! │  - SQLite (local)                       │
//! │  - data platform REST table             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Security
//!
//! - Refresh tokens are only ever persisted as ciphertext
//! - Each encryption uses a fresh nonce (never reused)
//! - Authenticated encryption (tampering detected)

use serde::{Deserialize, Serialize};

mod encryption;
mod platform;
mod storage;

pub use encryption::{decrypt, derive_key, encrypt, CipherError, CredentialCipher};
pub use platform::PlatformCredentialStore;
pub use storage::{CredentialStore, SqliteCredentialStore};

/// The only persisted entity: an encrypted refresh token for one user and provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Stable user identifier resolved by the identity verifier
    pub owner_user_id: String,

    /// Provider tag (e.g. "google")
    pub provider: String,

    /// `base64(nonce || ciphertext || tag)`, replaced on rotation
    pub refresh_token_cipher: String,
}

impl CredentialRecord {
    pub fn new(owner_user_id: &str, provider: &str, refresh_token_cipher: String) -> Self {
        Self {
            owner_user_id: owner_user_id.to_string(),
            provider: provider.to_string(),
            refresh_token_cipher,
        }
    }
}
