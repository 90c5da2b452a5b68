//! The backend contract every pipeline is written against.
//!
//! A backend channel is an append-only log of named attachments:
//!   - `put` appends one immutable object and returns an opaque handle
//!   - `scan_history` enumerates at most `page_cap` objects, most recent first
//!     where the backend can tell, as a possibly-stale snapshot
//!   - `fetch` reads one object's payload on demand
//!   - `delete` removes one object; a missing object is reported, not an error
//!
//! There is no index, no transaction, and no compare-and-swap. Callers pace
//! their puts themselves.

use async_trait::async_trait;
use bytes::Bytes;
use chanstore_core::{ChannelRef, StoreError};
use futures::stream::BoxStream;
use std::fmt;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// The channel or its scope could not be resolved.
    #[error("channel unavailable: {0}")]
    Unavailable(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object too large: {size} bytes exceeds the {limit}-byte ceiling")]
    TooLarge { size: usize, limit: usize },

    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<BackendError> for StoreError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Unavailable(msg) => StoreError::BackendUnavailable(msg),
            BackendError::NotFound(msg) => StoreError::NotFound(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Opaque handle of one stored object, used for fetch and delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle(String);

impl ObjectHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        ObjectHandle(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One object visited by a history scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Attachment name as stored (possibly rewritten by the backend)
    pub name: String,
    pub handle: ObjectHandle,
    /// Backend append position; larger means more recent
    pub sequence: u64,
    /// Payload size in bytes
    pub size: u64,
}

/// Outcome of a best-effort delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The object was already absent.
    NotFound,
}

pub type HistoryStream<'a> = BoxStream<'a, BackendResult<HistoryEntry>>;

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Append one named object to the channel.
    async fn put(
        &self,
        channel: &ChannelRef,
        name: &str,
        payload: Bytes,
    ) -> BackendResult<ObjectHandle>;

    /// Enumerate at most `page_cap` previously appended objects.
    ///
    /// Fails with [`BackendError::Unavailable`] before yielding anything when
    /// the channel cannot be resolved.
    async fn scan_history<'a>(
        &'a self,
        channel: &'a ChannelRef,
        page_cap: usize,
    ) -> BackendResult<HistoryStream<'a>>;

    /// Read the payload of a scanned object.
    async fn fetch(&self, channel: &ChannelRef, handle: &ObjectHandle) -> BackendResult<Bytes>;

    /// Remove one object.
    async fn delete(
        &self,
        channel: &ChannelRef,
        handle: &ObjectHandle,
    ) -> BackendResult<DeleteOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_maps_to_backend_unavailable() {
        let err: StoreError = BackendError::Unavailable("guild/vault".into()).into();
        assert!(matches!(err, StoreError::BackendUnavailable(_)));
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err: StoreError = BackendError::NotFound("abc.part".into()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn other_errors_map_to_backend() {
        let err: StoreError = BackendError::TooLarge { size: 11, limit: 10 }.into();
        match err {
            StoreError::Backend(msg) => assert!(msg.contains("11 bytes")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
