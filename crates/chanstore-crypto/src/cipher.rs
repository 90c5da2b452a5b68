//! Whole-payload XChaCha20-Poly1305 encryption/decryption
//!
//! Each call to [`Cipher::encrypt`] draws a fresh random nonce, so encrypting
//! the same payload twice yields different ciphertexts. [`Cipher::decrypt`]
//! rejects anything that was not produced by `encrypt` under the same key,
//! including plaintext input.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

use crate::{KEY_SIZE, NONCE_SIZE, OVERHEAD};

#[derive(Debug, Error)]
pub enum CipherError {
    /// Wrong key, corrupted ciphertext, or input that was never encrypted.
    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone)]
pub struct CipherKey {
    bytes: [u8; KEY_SIZE],
}

impl CipherKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Parse a base64 key (standard or URL-safe alphabet).
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let encoded = encoded.trim();
        let mut decoded = STANDARD
            .decode(encoded)
            .or_else(|_| URL_SAFE.decode(encoded))
            .map_err(|e| CipherError::InvalidKey(format!("base64 decode: {e}")))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CipherError::InvalidKey(format!(
                "key has wrong size: {len} bytes (expected {KEY_SIZE})"
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Stateless authenticated cipher bound to one key.
#[derive(Debug, Clone)]
pub struct Cipher {
    key: CipherKey,
}

impl Cipher {
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    /// Encrypt a payload.
    ///
    /// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt a payload produced by [`Cipher::encrypt`].
    pub fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>, CipherError> {
        if encrypted.len() < OVERHEAD {
            return Err(CipherError::Authentication(
                "payload shorter than nonce and tag",
            ));
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = XChaCha20Poly1305::new(self.key.as_bytes().into());

        cipher.decrypt(nonce, ciphertext).map_err(|_| {
            CipherError::Authentication("invalid key, corrupted data, or plaintext input")
        })
    }
}
