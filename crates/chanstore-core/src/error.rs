use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The target channel (or its scope) could not be resolved by the backend.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A manifest or a chunk it references is absent from the scanned history.
    #[error("not found: {0}")]
    NotFound(String),

    /// Decryption failed: wrong key, corrupted ciphertext, or plaintext input.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Manifest bytes parse neither as ciphertext nor as plaintext JSON.
    #[error("corrupt manifest: {0}")]
    CorruptManifest(String),

    /// Upload stopped after some objects were written. Written chunks are
    /// orphaned and never reclaimed automatically.
    #[error(
        "partial upload of '{name}': {chunks_written} chunk(s) written, manifest written: {manifest_written}: {source}"
    )]
    PartialUpload {
        name: String,
        chunks_written: usize,
        manifest_written: bool,
        #[source]
        source: Box<StoreError>,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_upload_reports_progress_and_cause() {
        let err = StoreError::PartialUpload {
            name: "report.pdf".into(),
            chunks_written: 2,
            manifest_written: false,
            source: Box::new(StoreError::Backend("rate limited".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("report.pdf"));
        assert!(msg.contains("2 chunk(s)"));
        assert!(msg.contains("rate limited"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn not_found_predicate() {
        assert!(StoreError::NotFound("x".into()).is_not_found());
        assert!(!StoreError::Authentication("x".into()).is_not_found());
    }
}
