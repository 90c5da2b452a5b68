//! Backend factory: turns `[backend]` configuration into a `BackendClient`.

use anyhow::{Context, Result};
use chanstore_core::config::{BackendConfig, BackendKind};
use opendal::Operator;
use std::sync::Arc;

use crate::channel::OpendalChannel;
use crate::client::BackendClient;
use crate::memory::MemoryBackend;

/// S3 credentials, read from the environment by [`build_backend`].
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl S3Credentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("CHANSTORE_ACCESS_KEY_ID"))
            .context("S3 credentials not set: export AWS_ACCESS_KEY_ID")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("CHANSTORE_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY not set")?;
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

/// Build an OpenDAL operator for the configured service.
///
/// No retry layer is installed: failed backend calls surface to the pipeline
/// unchanged.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_operator(cfg: &BackendConfig, creds: Option<&S3Credentials>) -> Result<Operator> {
    let op = match cfg.kind {
        BackendKind::Memory => Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish(),
        BackendKind::Fs => {
            let root = cfg.root.to_string_lossy();
            Operator::new(opendal::services::Fs::default().root(&root))
                .with_context(|| format!("creating OpenDAL fs operator at {root}"))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish()
        }
        BackendKind::S3 => {
            if cfg.endpoint.starts_with("http://") {
                if cfg.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set backend.enforce_tls = false for local development.",
                        cfg.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %cfg.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
                );
            }
            let creds = creds.context("S3 backend requires credentials")?;
            // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
            let builder = opendal::services::S3::default()
                .endpoint(&cfg.endpoint)
                .region(&cfg.region)
                .bucket(&cfg.bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            Operator::new(builder)
                .context("creating OpenDAL S3 operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .finish()
        }
    };
    Ok(op)
}

/// Build the backend client described by `cfg`.
///
/// The `memory` kind yields a [`MemoryBackend`] that registers channels on
/// first use. `fs` and `s3` yield an [`OpendalChannel`]; their channels must
/// exist (see [`OpendalChannel::create_channel`]).
pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn BackendClient>> {
    match cfg.kind {
        BackendKind::Memory => Ok(Arc::new(
            MemoryBackend::new()
                .with_auto_create(true)
                .with_rename_spaces(cfg.rename_spaces),
        )),
        BackendKind::Fs => {
            let op = build_operator(cfg, None)?;
            Ok(Arc::new(
                OpendalChannel::new(op, cfg.prefix.clone()).with_rename_spaces(cfg.rename_spaces),
            ))
        }
        BackendKind::S3 => {
            let creds = S3Credentials::from_env()?;
            let op = build_operator(cfg, Some(&creds))?;
            Ok(Arc::new(
                OpendalChannel::new(op, cfg.prefix.clone()).with_rename_spaces(cfg.rename_spaces),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> S3Credentials {
        S3Credentials {
            access_key_id: "test-key".into(),
            secret_access_key: "test-secret".into(),
        }
    }

    #[test]
    fn test_build_s3_operator_valid() {
        let cfg = BackendConfig {
            kind: BackendKind::S3,
            endpoint: "http://localhost:8333".into(),
            ..Default::default()
        };
        assert!(build_operator(&cfg, Some(&creds())).is_ok());
    }

    #[test]
    fn test_s3_http_with_enforce_tls_fails() {
        let cfg = BackendConfig {
            kind: BackendKind::S3,
            endpoint: "http://insecure:8333".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let result = build_operator(&cfg, Some(&creds()));
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(result.unwrap_err().to_string().contains("enforce_tls"));
    }

    #[test]
    fn test_s3_without_credentials_fails() {
        let cfg = BackendConfig {
            kind: BackendKind::S3,
            endpoint: "https://s3.example.com".into(),
            ..Default::default()
        };
        assert!(build_operator(&cfg, None).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", creds());
        assert!(rendered.contains("test-key"));
        assert!(!rendered.contains("test-secret"));
    }

    #[tokio::test]
    async fn test_fs_backend_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = BackendConfig {
            kind: BackendKind::Fs,
            root: tmp.path().to_path_buf(),
            ..Default::default()
        };
        let op = build_operator(&cfg, None).unwrap();
        let channel = OpendalChannel::new(op, cfg.prefix.clone());
        let ch = chanstore_core::ChannelRef::new("local", "vault");
        channel.create_channel(&ch).await.unwrap();

        let handle = channel
            .put(&ch, "hello.txt", bytes::Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert_eq!(channel.fetch(&ch, &handle).await.unwrap(), "hi");
    }

    #[test]
    fn test_build_memory_backend() {
        let backend = build_backend(&BackendConfig::default());
        assert!(backend.is_ok());
    }
}
