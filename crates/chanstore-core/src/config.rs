use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration (loaded from chanstore.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanstoreConfig {
    pub store: StoreConfig,
    pub crypto: CryptoConfig,
    pub backend: BackendConfig,
}

impl ChanstoreConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Chunking, pacing, and scan limits shared by every pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum payload size of one backend object in bytes (default: 10 MiB)
    pub chunk_limit: usize,
    /// Fixed delay between consecutive puts in milliseconds (default: 1500)
    pub put_delay_ms: u64,
    /// Fixed delay between consecutive deletes in milliseconds (default: 500)
    pub delete_delay_ms: u64,
    /// Maximum number of history entries a single scan visits (default: 2000)
    pub page_cap: usize,
    /// Directory receiving downloaded files and archives
    pub data_dir: PathBuf,
}

impl StoreConfig {
    pub fn put_delay(&self) -> Duration {
        Duration::from_millis(self.put_delay_ms)
    }

    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }
}

/// Cipher key material. The key is resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Base64-encoded 32-byte key (takes precedence over `key_env`)
    pub key: Option<String>,
    /// Environment variable holding the base64 key (default: CHANSTORE_KEY)
    pub key_env: String,
    /// Environment variable holding a passphrase to derive the key from
    pub passphrase_env: Option<String>,
    /// Base64-encoded 16-byte Argon2id salt, required with `passphrase_env`
    pub salt: Option<String>,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local append-only channel (tests, dry runs)
    Memory,
    /// Channel emulated on a local directory through OpenDAL
    Fs,
    /// Channel emulated on an S3-compatible bucket through OpenDAL
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Root directory for the `fs` backend
    pub root: PathBuf,
    /// Key prefix under which channels are laid out
    pub prefix: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Reject plaintext HTTP endpoints
    pub enforce_tls: bool,
    /// Rewrite spaces in object names to underscores, as chat channels do
    pub rename_spaces: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_limit: 10 * 1024 * 1024,
            put_delay_ms: 1500,
            delete_delay_ms: 500,
            page_cap: 2000,
            data_dir: PathBuf::from("Data"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key: None,
            key_env: "CHANSTORE_KEY".into(),
            passphrase_env: None,
            salt: None,
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            root: PathBuf::from("channels"),
            prefix: "chanstore".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "chanstore".into(),
            enforce_tls: false,
            rename_spaces: true,
        }
    }
}
