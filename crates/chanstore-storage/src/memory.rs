//! In-process append-only channel backend.
//!
//! Behaves like a chat channel: objects are only ever appended, history is
//! returned most-recent-first, names may be rewritten (spaces become
//! underscores), and unknown channels are unavailable until created.
//! Test hooks can corrupt, remove, or refuse objects to exercise failure paths.

use async_trait::async_trait;
use bytes::Bytes;
use chanstore_core::types::sanitized_object_name;
use chanstore_core::ChannelRef;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::{
    BackendClient, BackendError, BackendResult, DeleteOutcome, HistoryEntry, HistoryStream,
    ObjectHandle,
};

#[derive(Debug, Clone)]
struct StoredObject {
    name: String,
    handle: ObjectHandle,
    sequence: u64,
    payload: Bytes,
}

#[derive(Debug, Default)]
struct MemoryState {
    channels: HashMap<ChannelRef, Vec<StoredObject>>,
    next_sequence: u64,
    /// Remaining successful puts before every put fails (fault injection)
    put_budget: Option<usize>,
    puts: usize,
    deletes: usize,
}

/// Thread-safe in-memory backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    rename_spaces: bool,
    auto_create: bool,
    max_object_size: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite spaces in attachment names to underscores on put.
    pub fn with_rename_spaces(mut self, rename: bool) -> Self {
        self.rename_spaces = rename;
        self
    }

    /// Register unknown channels on first use instead of refusing them.
    pub fn with_auto_create(mut self, auto: bool) -> Self {
        self.auto_create = auto;
        self
    }

    /// Reject payloads larger than `limit` bytes.
    pub fn with_max_object_size(mut self, limit: usize) -> Self {
        self.max_object_size = Some(limit);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a channel resolvable. Idempotent.
    pub fn create_channel(&self, channel: &ChannelRef) {
        self.lock().channels.entry(channel.clone()).or_default();
    }

    /// Allow `n` more successful puts, then fail every put.
    pub fn fail_puts_after(&self, n: usize) {
        self.lock().put_budget = Some(n);
    }

    /// Names of every object currently in the channel, oldest first.
    pub fn object_names(&self, channel: &ChannelRef) -> Vec<String> {
        self.lock()
            .channels
            .get(channel)
            .map(|objs| objs.iter().map(|o| o.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Payload of the most recent object stored under `name`.
    pub fn payload(&self, channel: &ChannelRef, name: &str) -> Option<Bytes> {
        self.lock()
            .channels
            .get(channel)
            .and_then(|objs| objs.iter().rev().find(|o| o.name == name))
            .map(|o| o.payload.clone())
    }

    /// Swap the payload of every object named `name`. Returns whether any matched.
    pub fn replace_payload(&self, channel: &ChannelRef, name: &str, payload: Bytes) -> bool {
        let mut state = self.lock();
        let mut matched = false;
        if let Some(objs) = state.channels.get_mut(channel) {
            for obj in objs.iter_mut().filter(|o| o.name == name) {
                obj.payload = payload.clone();
                matched = true;
            }
        }
        matched
    }

    /// Drop every object named `name` behind the pipelines' back.
    pub fn remove(&self, channel: &ChannelRef, name: &str) -> bool {
        let mut state = self.lock();
        match state.channels.get_mut(channel) {
            Some(objs) => {
                let before = objs.len();
                objs.retain(|o| o.name != name);
                objs.len() != before
            }
            None => false,
        }
    }

    /// Number of objects in the channel.
    pub fn len(&self, channel: &ChannelRef) -> usize {
        self.lock().channels.get(channel).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, channel: &ChannelRef) -> bool {
        self.len(channel) == 0
    }

    /// Total successful puts and deletes served so far.
    pub fn op_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.puts, state.deletes)
    }
}

fn unavailable(channel: &ChannelRef) -> BackendError {
    BackendError::Unavailable(format!("channel '{channel}' not found"))
}

impl MemoryState {
    fn channel_mut(
        &mut self,
        channel: &ChannelRef,
        auto_create: bool,
    ) -> BackendResult<&mut Vec<StoredObject>> {
        if auto_create {
            return Ok(self.channels.entry(channel.clone()).or_default());
        }
        self.channels.get_mut(channel).ok_or_else(|| unavailable(channel))
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn put(
        &self,
        channel: &ChannelRef,
        name: &str,
        payload: Bytes,
    ) -> BackendResult<ObjectHandle> {
        if let Some(limit) = self.max_object_size {
            if payload.len() > limit {
                return Err(BackendError::TooLarge {
                    size: payload.len(),
                    limit,
                });
            }
        }

        let stored_name = if self.rename_spaces {
            sanitized_object_name(name)
        } else {
            name.to_string()
        };

        let mut state = self.lock();
        state.channel_mut(channel, self.auto_create)?;
        if let Some(budget) = state.put_budget.as_mut() {
            if *budget == 0 {
                return Err(BackendError::Storage("injected put failure".into()));
            }
            *budget -= 1;
        }

        state.next_sequence += 1;
        let sequence = state.next_sequence;
        let handle = ObjectHandle::new(format!("{channel}#{sequence}"));
        state.puts += 1;
        state.channel_mut(channel, self.auto_create)?.push(StoredObject {
            name: stored_name,
            handle: handle.clone(),
            sequence,
            payload,
        });
        Ok(handle)
    }

    async fn scan_history<'a>(
        &'a self,
        channel: &'a ChannelRef,
        page_cap: usize,
    ) -> BackendResult<HistoryStream<'a>> {
        let mut state = self.lock();
        let objs = state.channel_mut(channel, self.auto_create)?;

        let snapshot: Vec<BackendResult<HistoryEntry>> = objs
            .iter()
            .rev()
            .take(page_cap)
            .map(|o| {
                Ok(HistoryEntry {
                    name: o.name.clone(),
                    handle: o.handle.clone(),
                    sequence: o.sequence,
                    size: o.payload.len() as u64,
                })
            })
            .collect();

        Ok(futures::stream::iter(snapshot).boxed())
    }

    async fn fetch(&self, channel: &ChannelRef, handle: &ObjectHandle) -> BackendResult<Bytes> {
        let mut state = self.lock();
        let objs = state.channel_mut(channel, self.auto_create)?;
        objs.iter()
            .find(|o| &o.handle == handle)
            .map(|o| o.payload.clone())
            .ok_or_else(|| BackendError::NotFound(handle.to_string()))
    }

    async fn delete(
        &self,
        channel: &ChannelRef,
        handle: &ObjectHandle,
    ) -> BackendResult<DeleteOutcome> {
        let mut state = self.lock();
        let objs = state.channel_mut(channel, self.auto_create)?;
        let before = objs.len();
        objs.retain(|o| &o.handle != handle);
        if objs.len() == before {
            return Ok(DeleteOutcome::NotFound);
        }
        state.deletes += 1;
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn channel() -> ChannelRef {
        ChannelRef::new("guild", "vault")
    }

    async fn scan_names(backend: &MemoryBackend, cap: usize) -> Vec<String> {
        let ch = channel();
        backend
            .scan_history(&ch, cap)
            .await
            .unwrap()
            .map_ok(|e| e.name)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_channel_is_unavailable() {
        let backend = MemoryBackend::new();
        let err = backend
            .put(&channel(), "a", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(matches!(
            backend.scan_history(&channel(), 10).await.err(),
            Some(BackendError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn auto_create_registers_on_first_use() {
        let backend = MemoryBackend::new().with_auto_create(true);
        assert!(backend.scan_history(&channel(), 10).await.is_ok());
        backend
            .put(&channel(), "a", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(backend.len(&channel()), 1);
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_capped() {
        let backend = MemoryBackend::new();
        backend.create_channel(&channel());
        for name in ["one", "two", "three"] {
            backend
                .put(&channel(), name, Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        assert_eq!(scan_names(&backend, 10).await, vec!["three", "two", "one"]);
        assert_eq!(scan_names(&backend, 2).await, vec!["three", "two"]);
    }

    #[tokio::test]
    async fn fetch_and_delete_by_handle() {
        let backend = MemoryBackend::new();
        backend.create_channel(&channel());
        let h = backend
            .put(&channel(), "blob", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        assert_eq!(backend.fetch(&channel(), &h).await.unwrap(), "payload");
        assert_eq!(
            backend.delete(&channel(), &h).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            backend.delete(&channel(), &h).await.unwrap(),
            DeleteOutcome::NotFound
        );
        assert!(matches!(
            backend.fetch(&channel(), &h).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn renames_spaces_when_enabled() {
        let backend = MemoryBackend::new().with_rename_spaces(true);
        backend.create_channel(&channel());
        backend
            .put(&channel(), "my file_metadata.json", Bytes::new())
            .await
            .unwrap();
        assert_eq!(
            backend.object_names(&channel()),
            vec!["my_file_metadata.json"]
        );
    }

    #[tokio::test]
    async fn enforces_object_ceiling() {
        let backend = MemoryBackend::new().with_max_object_size(4);
        backend.create_channel(&channel());
        let err = backend
            .put(&channel(), "big", Bytes::from_static(b"12345"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::TooLarge { size: 5, limit: 4 }));
    }

    #[tokio::test]
    async fn put_budget_injects_failures() {
        let backend = MemoryBackend::new();
        backend.create_channel(&channel());
        backend.fail_puts_after(1);
        assert!(backend.put(&channel(), "a", Bytes::new()).await.is_ok());
        assert!(backend.put(&channel(), "b", Bytes::new()).await.is_err());
        assert_eq!(backend.len(&channel()), 1);
    }

    #[tokio::test]
    async fn scan_is_a_snapshot() {
        let backend = MemoryBackend::new();
        backend.create_channel(&channel());
        backend.put(&channel(), "old", Bytes::new()).await.unwrap();

        let ch = channel();
        let stream = backend.scan_history(&ch, 10).await.unwrap();
        backend.put(&channel(), "new", Bytes::new()).await.unwrap();

        let names: Vec<String> = stream.map_ok(|e| e.name).try_collect().await.unwrap();
        assert_eq!(names, vec!["old"]);
    }
}
