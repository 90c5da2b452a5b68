//! Append-only channel emulated on an OpenDAL object store.
//!
//! Layout under the configured prefix:
//! ```text
//! {prefix}/{scope}/{channel}/.channel                      marker, created once
//! {prefix}/{scope}/{channel}/{sequence:020}-{uuid}/{name}  one object per put
//! ```
//! `sequence` is a microsecond timestamp kept strictly increasing within the
//! process, so lexical key order is append order. Keys are never overwritten;
//! two puts with the same name create two objects, exactly like a channel.

use async_trait::async_trait;
use bytes::Bytes;
use chanstore_core::types::sanitized_object_name;
use chanstore_core::ChannelRef;
use futures::StreamExt;
use opendal::{ErrorKind, Operator};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::client::{
    BackendClient, BackendError, BackendResult, DeleteOutcome, HistoryEntry, HistoryStream,
    ObjectHandle,
};

const MARKER: &str = ".channel";

pub struct OpendalChannel {
    op: Operator,
    prefix: String,
    rename_spaces: bool,
    last_sequence: AtomicU64,
}

fn storage(e: opendal::Error) -> BackendError {
    if e.kind() == ErrorKind::NotFound {
        BackendError::NotFound(e.to_string())
    } else {
        BackendError::Storage(e.to_string())
    }
}

impl OpendalChannel {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into().trim_matches('/').to_string(),
            rename_spaces: false,
            last_sequence: AtomicU64::new(0),
        }
    }

    pub fn with_rename_spaces(mut self, rename: bool) -> Self {
        self.rename_spaces = rename;
        self
    }

    fn channel_dir(&self, channel: &ChannelRef) -> String {
        if self.prefix.is_empty() {
            format!("{}/{}/", channel.scope, channel.channel)
        } else {
            format!("{}/{}/{}/", self.prefix, channel.scope, channel.channel)
        }
    }

    /// Create the channel marker so the channel becomes resolvable.
    pub async fn create_channel(&self, channel: &ChannelRef) -> BackendResult<()> {
        let marker = format!("{}{MARKER}", self.channel_dir(channel));
        self.op
            .write(&marker, Vec::<u8>::new())
            .await
            .map_err(storage)?;
        debug!(channel = %channel, "channel created");
        Ok(())
    }

    async fn ensure_channel(&self, channel: &ChannelRef) -> BackendResult<String> {
        let dir = self.channel_dir(channel);
        let exists = self
            .op
            .exists(&format!("{dir}{MARKER}"))
            .await
            .map_err(|e| BackendError::Unavailable(format!("{channel}: {e}")))?;
        if !exists {
            return Err(BackendError::Unavailable(format!(
                "channel '{channel}' not found"
            )));
        }
        Ok(dir)
    }

    fn next_sequence(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        let mut last = self.last_sequence.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_sequence.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Parse `{sequence:020}-{uuid}/{name}` relative to the channel directory.
fn parse_object_key(relative: &str) -> Option<(u64, &str)> {
    let (stamp, name) = relative.split_once('/')?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    let sequence = stamp.split_once('-')?.0.parse().ok()?;
    Some((sequence, name))
}

#[async_trait]
impl BackendClient for OpendalChannel {
    async fn put(
        &self,
        channel: &ChannelRef,
        name: &str,
        payload: Bytes,
    ) -> BackendResult<ObjectHandle> {
        if name.is_empty() || name.contains('/') || name == MARKER {
            return Err(BackendError::InvalidName(name.to_string()));
        }
        let dir = self.ensure_channel(channel).await?;

        let stored_name = if self.rename_spaces {
            sanitized_object_name(name)
        } else {
            name.to_string()
        };
        let key = format!(
            "{dir}{:020}-{}/{stored_name}",
            self.next_sequence(),
            uuid::Uuid::new_v4().simple()
        );

        self.op.write(&key, payload).await.map_err(storage)?;
        Ok(ObjectHandle::new(key))
    }

    async fn scan_history<'a>(
        &'a self,
        channel: &'a ChannelRef,
        page_cap: usize,
    ) -> BackendResult<HistoryStream<'a>> {
        let dir = self.ensure_channel(channel).await?;
        let listed = self
            .op
            .list_with(&dir)
            .recursive(true)
            .await
            .map_err(storage)?;

        let mut entries: Vec<HistoryEntry> = listed
            .into_iter()
            .filter(|e| !e.metadata().mode().is_dir())
            .filter_map(|e| {
                let relative = e.path().strip_prefix(dir.as_str())?;
                let (sequence, name) = parse_object_key(relative)?;
                Some(HistoryEntry {
                    name: name.to_string(),
                    handle: ObjectHandle::new(e.path()),
                    sequence,
                    size: e.metadata().content_length(),
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.sequence
                .cmp(&a.sequence)
                .then_with(|| b.handle.as_str().cmp(a.handle.as_str()))
        });
        entries.truncate(page_cap);

        Ok(futures::stream::iter(entries.into_iter().map(Ok)).boxed())
    }

    async fn fetch(&self, channel: &ChannelRef, handle: &ObjectHandle) -> BackendResult<Bytes> {
        let dir = self.channel_dir(channel);
        if !handle.as_str().starts_with(&dir) {
            return Err(BackendError::NotFound(handle.to_string()));
        }
        let buf = self.op.read(handle.as_str()).await.map_err(storage)?;
        Ok(buf.to_bytes())
    }

    async fn delete(
        &self,
        channel: &ChannelRef,
        handle: &ObjectHandle,
    ) -> BackendResult<DeleteOutcome> {
        let dir = self.ensure_channel(channel).await?;
        if !handle.as_str().starts_with(&dir) {
            return Ok(DeleteOutcome::NotFound);
        }
        if !self.op.exists(handle.as_str()).await.map_err(storage)? {
            return Ok(DeleteOutcome::NotFound);
        }
        self.op.delete(handle.as_str()).await.map_err(storage)?;
        Ok(DeleteOutcome::Deleted)
    }
}
