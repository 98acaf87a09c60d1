//! At-rest encryption for stored OAuth tokens.
//!
//! Tokens are encrypted with AES-256-GCM and stored as
//! `enc:v1:NONCE:CIPHERTEXT` (both base64). Without a configured key the
//! cipher passes values through unchanged.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use thiserror::Error;

const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Nonce length in bytes (96 bits for AES-GCM).
const NONCE_LENGTH: usize = 12;

/// Key length in bytes (256 bits for AES-256).
const KEY_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid encrypted format: {0}")]
    InvalidFormat(String),

    #[error("Value is encrypted but no encryption key is configured")]
    KeyNotAvailable,
}

/// Encrypts and decrypts token strings.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Option<Aes256Gcm>,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl TokenCipher {
    /// Build a cipher from a 32-byte key given as hex (64 chars) or base64.
    /// `None` disables encryption.
    pub fn from_key(key: Option<&str>) -> Result<Self, CryptoError> {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Ok(Self::disabled());
        };

        let bytes = parse_key(key)?;
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            cipher: Some(cipher),
        })
    }

    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt a value. Already-encrypted values are returned unchanged.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_string());
        };
        if is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{}{}:{}",
            ENCRYPTED_PREFIX,
            BASE64.encode(nonce_bytes),
            BASE64.encode(ciphertext)
        ))
    }

    /// Decrypt a value. Plaintext values pass through.
    pub fn decrypt(&self, value: &str) -> Result<String, CryptoError> {
        let Some(inner) = value.strip_prefix(ENCRYPTED_PREFIX) else {
            return Ok(value.to_string());
        };
        let cipher = self.cipher.as_ref().ok_or(CryptoError::KeyNotAvailable)?;

        let (nonce_b64, ciphertext_b64) = inner.split_once(':').ok_or_else(|| {
            CryptoError::InvalidFormat("expected NONCE:CIPHERTEXT format".to_string())
        })?;

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;

        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(CryptoError::InvalidFormat(format!(
                "nonce length {} != {}",
                nonce_bytes.len(),
                NONCE_LENGTH
            )));
        }

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed("decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {}", e)))
    }
}

pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Generate a fresh key, hex encoded.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LENGTH];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

fn parse_key(key: &str) -> Result<[u8; KEY_LENGTH], CryptoError> {
    let bytes = if key.len() == KEY_LENGTH * 2 && key.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?
    } else {
        BASE64
            .decode(key)
            .map_err(|_| CryptoError::InvalidKey("expected 32 bytes as hex or base64".to_string()))?
    };

    bytes.try_into().map_err(|b: Vec<u8>| {
        CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_LENGTH, b.len()))
    })
}
