//! Key derivation: Argon2id passphrase → cipher key
//!
//! Runs once at startup when the configuration names a passphrase instead of
//! a raw key. Pipelines only ever see the resulting [`CipherKey`].

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::cipher::CipherKey;
use crate::KEY_SIZE;

/// Argon2id parameters for KDF
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive a 256-bit cipher key from a passphrase and salt using Argon2id.
///
/// The salt should be 16 random bytes kept in configuration (it does not need
/// to be secret, but must not change or previously stored payloads become
/// unreadable).
pub fn derive_key(
    passphrase: &SecretString,
    salt: &[u8; 16],
    params: &KdfParams,
) -> anyhow::Result<CipherKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| anyhow::anyhow!("invalid Argon2id params: {e}"))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| anyhow::anyhow!("Argon2id KDF failed: {e}"))?;

    let derived = CipherKey::from_bytes(key);
    key.zeroize();
    tracing::debug!(
        mem_cost_kib = params.mem_cost_kib,
        time_cost = params.time_cost,
        "cipher key derived from passphrase"
    );
    Ok(derived)
}
