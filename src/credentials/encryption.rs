//! AES-256-GCM encryption for stored refresh tokens.
//!
//! The key is the SHA-256 digest of the configured secret, so any secret length
//! maps to a 256-bit key. This is not a password-hardening KDF: the secret must be
//! a high-entropy value provisioned by the operator.
//!
//! Stored blob layout: `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of the derived key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag appended to the ciphertext
const TAG_SIZE: usize = 16;

/// Cipher failures. All of them are permanent for the given input.
#[derive(Debug, Clone, PartialEq)]
pub enum CipherError {
    /// Blob is not valid base64
    Decode(String),
    /// Blob decodes but is too short to hold a nonce and tag
    Malformed(usize),
    /// Secret is empty or the key has an unsupported size
    InvalidKey(String),
    /// The AEAD refused to encrypt
    Encrypt,
    /// Tag mismatch: wrong secret or tampered blob
    Authentication,
    /// Plaintext is not UTF-8
    InvalidUtf8,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherError::Decode(msg) => write!(f, "Failed to decode ciphertext: {}", msg),
            CipherError::Malformed(len) => write!(
                f,
                "Ciphertext too short: expected at least {} bytes, got {}",
                NONCE_SIZE + TAG_SIZE,
                len
            ),
            CipherError::InvalidKey(msg) => write!(f, "Invalid encryption key: {}", msg),
            CipherError::Encrypt => write!(f, "Encryption failed"),
            CipherError::Authentication => {
                write!(f, "Decryption failed (wrong key or corrupted data)")
            }
            CipherError::InvalidUtf8 => write!(f, "Decrypted data is not valid UTF-8"),
        }
    }
}

impl std::error::Error for CipherError {}

/// Derives the 256-bit AES key from an operator secret.
pub fn derive_key(secret: &str) -> [u8; KEY_SIZE] {
    let digest = Sha256::digest(secret.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

/// Symmetric cipher bound to one derived key.
///
/// Holds no mutable state: every call draws a fresh random nonce, so a single
/// instance can be shared freely across concurrent requests.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_SIZE],
}

impl CredentialCipher {
    /// Builds a cipher from the configured secret.
    ///
    /// # Errors
    /// * `CipherError::InvalidKey` - If the secret is empty
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::InvalidKey("secret is empty".to_string()));
        }

        Ok(Self {
            key: derive_key(secret),
        })
    }

    fn aead(&self) -> Result<Aes256Gcm, CipherError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| CipherError::InvalidKey(e.to_string()))
    }

    /// Encrypts a token into a base64 blob with its nonce prepended.
    ///
    /// # Security
    /// - Uses a cryptographically secure random nonce (never reuse)
    /// - Authenticated encryption (tampering detected)
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let cipher = self.aead()?;

        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(blob))
    }

    /// Decrypts a blob produced by [`CredentialCipher::encrypt`].
    ///
    /// Fails closed: a tampered blob or a different secret yields
    /// `CipherError::Authentication`, never partial plaintext.
    pub fn decrypt(&self, blob: &str) -> Result<String, CipherError> {
        let bytes = BASE64
            .decode(blob.trim())
            .map_err(|e| CipherError::Decode(e.to_string()))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::Malformed(bytes.len()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let cipher = self.aead()?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Encrypts `plaintext` under the key derived from `secret`.
pub fn encrypt(plaintext: &str, secret: &str) -> Result<String, CipherError> {
    CredentialCipher::from_secret(secret)?.encrypt(plaintext)
}

/// Decrypts a stored blob under the key derived from `secret`.
pub fn decrypt(blob: &str, secret: &str) -> Result<String, CipherError> {
    CredentialCipher::from_secret(secret)?.decrypt(blob)
}
