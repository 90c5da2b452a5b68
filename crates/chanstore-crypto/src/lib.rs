//! chanstore-crypto: authenticated encryption of whole payloads
//!
//! One process-wide key, loaded (or derived) once at startup, encrypts both
//! file payloads (before chunking) and serialized manifests.
//!
//! Ciphertext format:
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```

pub mod cipher;
pub mod kdf;

pub use cipher::{Cipher, CipherError, CipherKey};
pub use kdf::{derive_key, KdfParams};

/// Size of a cipher key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes added to every payload by [`Cipher::encrypt`]
pub const OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;
