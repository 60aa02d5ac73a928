//! Credential encryption using AES-256-GCM
//!
//! Provider credentials and access tokens are stored encrypted. Every
//! ciphertext carries a version byte and a random nonce, and is bound to its
//! provider through the additional authenticated data, so a ciphertext copied
//! onto another provider row fails to decrypt.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::providers::config::Credentials;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;
const KEY_LEN: usize = 32;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("decrypted credentials are malformed: {0}")]
    MalformedPlaintext(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CryptoKey(bytes))
    }

    /// Random key for local runs without a configured key.
    pub fn ephemeral() -> Self {
        CryptoKey(Aes256Gcm::generate_key(&mut OsRng).to_vec())
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }
    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

fn provider_aad(provider_id: Uuid) -> [u8; 16] {
    *provider_id.as_bytes()
}

/// Encrypt a provider's credentials document.
pub fn encrypt_credentials(
    key: &CryptoKey,
    provider_id: Uuid,
    credentials: &Credentials,
) -> Result<Vec<u8>, CryptoError> {
    let mut plaintext = serde_json::to_vec(credentials)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let sealed = encrypt_bytes(key, &provider_aad(provider_id), &plaintext);
    plaintext.zeroize();
    sealed
}

pub fn decrypt_credentials(
    key: &CryptoKey,
    provider_id: Uuid,
    ciphertext: &[u8],
) -> Result<Credentials, CryptoError> {
    let mut plaintext = decrypt_bytes(key, &provider_aad(provider_id), ciphertext)?;
    let parsed = serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::MalformedPlaintext(e.to_string()));
    plaintext.zeroize();
    parsed
}

pub fn encrypt_token(
    key: &CryptoKey,
    provider_id: Uuid,
    token: &str,
) -> Result<Vec<u8>, CryptoError> {
    encrypt_bytes(key, &provider_aad(provider_id), token.as_bytes())
}

pub fn decrypt_token(
    key: &CryptoKey,
    provider_id: Uuid,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let plaintext = decrypt_bytes(key, &provider_aad(provider_id), ciphertext)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::MalformedPlaintext(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        let decrypted = decrypt_bytes(&key, b"aad", &encrypted).unwrap();
        assert_eq!(decrypted, b"secret message");
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        encrypted[13] ^= 0x01;
        assert!(decrypt_bytes(&key, b"aad", &encrypted).is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let first = encrypt_bytes(&key, b"aad", b"same").unwrap();
        let second = encrypt_bytes(&key, b"aad", b"same").unwrap();
        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn test_unversioned_or_short_payload_rejected() {
        let key = test_key();
        assert!(matches!(
            decrypt_bytes(&key, b"aad", b"plain-token"),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[VERSION_ENCRYPTED, 0x02]),
            Err(CryptoError::InvalidFormat)
        ));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[]),
            Err(CryptoError::EmptyCiphertext)
        ));
    }

    #[test]
    fn test_credentials_bound_to_provider() {
        let key = test_key();
        let provider = Uuid::new_v4();
        let credentials = Credentials::OAuthClient {
            client_id: "client".to_string(),
            client_secret: "shh".to_string(),
        };

        let sealed = encrypt_credentials(&key, provider, &credentials).unwrap();
        assert_eq!(decrypt_credentials(&key, provider, &sealed).unwrap(), credentials);
        assert!(decrypt_credentials(&key, Uuid::new_v4(), &sealed).is_err());
    }

    #[test]
    fn test_token_roundtrip() {
        let key = test_key();
        let provider = Uuid::new_v4();
        let sealed = encrypt_token(&key, provider, "access-123").unwrap();
        assert_eq!(decrypt_token(&key, provider, &sealed).unwrap(), "access-123");
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
        assert_eq!(CryptoKey::ephemeral().as_bytes().len(), 32);
    }
}
