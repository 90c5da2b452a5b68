//! Resolved runtime configuration shared read-only by every pipeline.

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chanstore_core::config::{ChanstoreConfig, CryptoConfig, StoreConfig};
use chanstore_core::{StoreError, StoreResult};
use chanstore_crypto::{derive_key, Cipher, CipherError, CipherKey, KdfParams};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Everything a pipeline needs besides the backend: cipher, chunk limit,
/// pacing delays, scan cap, and the download directory.
///
/// Built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cipher: Cipher,
    pub chunk_limit: usize,
    pub put_delay: Duration,
    pub delete_delay: Duration,
    pub page_cap: usize,
    pub data_dir: PathBuf,
}

impl PipelineConfig {
    /// Defaults from `[store]` with the given cipher.
    pub fn new(cipher: Cipher) -> Self {
        Self::from_store(cipher, &StoreConfig::default())
    }

    fn from_store(cipher: Cipher, store: &StoreConfig) -> Self {
        Self {
            cipher,
            chunk_limit: store.chunk_limit,
            put_delay: store.put_delay(),
            delete_delay: store.delete_delay(),
            page_cap: store.page_cap,
            data_dir: store.data_dir.clone(),
        }
    }

    /// Resolve the cipher key and validate limits.
    pub fn from_config(cfg: &ChanstoreConfig) -> StoreResult<Self> {
        let key = resolve_key(&cfg.crypto)?;
        let config = Self::from_store(Cipher::new(key), &cfg.store);
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit;
        self
    }

    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = delay;
        self
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = delay;
        self
    }

    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = cap;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.chunk_limit == 0 {
            return Err(StoreError::Config("store.chunk_limit must be > 0".into()));
        }
        if self.page_cap == 0 {
            return Err(StoreError::Config("store.page_cap must be > 0".into()));
        }
        Ok(())
    }
}

/// Resolve the process-wide cipher key.
///
/// Precedence: inline `key`, then the `key_env` variable, then a passphrase
/// from `passphrase_env` stretched with Argon2id over `salt`.
pub fn resolve_key(cfg: &CryptoConfig) -> StoreResult<CipherKey> {
    if let Some(inline) = cfg.key.as_deref() {
        return CipherKey::from_base64(inline).map_err(|e| StoreError::Config(e.to_string()));
    }

    if let Ok(encoded) = std::env::var(&cfg.key_env) {
        return CipherKey::from_base64(&encoded)
            .map_err(|e| StoreError::Config(format!("{}: {e}", cfg.key_env)));
    }

    if let Some(var) = cfg.passphrase_env.as_deref() {
        let passphrase = std::env::var(var)
            .with_context(|| format!("passphrase variable {var} is not set"))
            .map_err(|e| StoreError::Config(format!("{e:#}")))?;
        let salt = decode_salt(cfg.salt.as_deref())?;
        let params = KdfParams {
            mem_cost_kib: cfg.argon2_mem_cost_kib,
            time_cost: cfg.argon2_time_cost,
            parallelism: cfg.argon2_parallelism,
        };
        return derive_key(&SecretString::from(passphrase), &salt, &params)
            .map_err(|e| StoreError::Config(format!("{e:#}")));
    }

    Err(StoreError::Config(format!(
        "no cipher key configured: set crypto.key, export {}, or configure crypto.passphrase_env",
        cfg.key_env
    )))
}

fn decode_salt(encoded: Option<&str>) -> StoreResult<[u8; 16]> {
    let encoded = encoded
        .ok_or_else(|| StoreError::Config("crypto.salt is required with a passphrase".into()))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| StoreError::Config(format!("crypto.salt: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| StoreError::Config("crypto.salt must decode to 16 bytes".into()))
}

/// Map a cipher failure onto the store taxonomy.
pub(crate) fn cipher_error(e: CipherError) -> StoreError {
    match e {
        CipherError::Authentication(reason) => StoreError::Authentication(reason.to_string()),
        other => StoreError::Other(anyhow::anyhow!(other)),
    }
}

/// Fixed inter-call pacing: every call after the first waits `delay`.
///
/// Applied unconditionally, never adapted to backend responses.
pub(crate) struct Pacer {
    delay: Duration,
    first: bool,
}

impl Pacer {
    pub(crate) fn new(delay: Duration) -> Self {
        Self { delay, first: true }
    }

    pub(crate) async fn wait(&mut self) {
        if !self.first && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.first = false;
    }
}
