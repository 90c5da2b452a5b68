//! History cache: one bounded scan turned into a name → handle table.
//!
//! The backend has no index, so resolving an object by name means scanning.
//! Building the table once per pipeline invocation makes resolving k chunks
//! cost one scan plus k lookups instead of k scans.
//!
//! When a name occurs more than once within the scanned window, the entry
//! with the highest backend sequence (the most recent append) wins for
//! by-name lookups. Manifest objects are additionally kept in full, since
//! distinct logical names can land on the same stored name once the backend
//! rewrites it.

use chanstore_core::types::{is_manifest_object_name, manifest_object_name, sanitized_object_name};
use chanstore_core::ChannelRef;
use futures::TryStreamExt;
use std::collections::HashMap;
use tracing::debug;

use crate::client::{BackendClient, BackendResult, HistoryEntry};

#[derive(Debug, Default, Clone)]
pub struct HistoryCache {
    entries: HashMap<String, HistoryEntry>,
    /// Every manifest-named entry, duplicates included
    manifests: Vec<HistoryEntry>,
    scanned: usize,
}

impl HistoryCache {
    /// Scan up to `page_cap` objects of `channel` and index them by name.
    pub async fn build(
        client: &dyn BackendClient,
        channel: &ChannelRef,
        page_cap: usize,
    ) -> BackendResult<Self> {
        let mut cache = HistoryCache::default();
        let mut stream = client.scan_history(channel, page_cap).await?;
        while let Some(entry) = stream.try_next().await? {
            cache.insert(entry);
        }
        debug!(
            channel = %channel,
            scanned = cache.scanned,
            distinct = cache.entries.len(),
            "history cache built"
        );
        Ok(cache)
    }

    /// Build a cache from already-scanned entries.
    pub fn from_entries(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut cache = HistoryCache::default();
        for entry in entries {
            cache.insert(entry);
        }
        cache
    }

    fn insert(&mut self, entry: HistoryEntry) {
        self.scanned += 1;
        if is_manifest_object_name(&entry.name) {
            self.manifests.push(entry.clone());
        }
        match self.entries.get(&entry.name) {
            Some(existing) if existing.sequence >= entry.sequence => {}
            _ => {
                self.entries.insert(entry.name.clone(), entry);
            }
        }
    }

    /// Look up an object by its stored name.
    pub fn get(&self, name: &str) -> Option<&HistoryEntry> {
        self.entries.get(name)
    }

    /// Look up an object by the name it was put under, tolerating the
    /// backend's space-to-underscore rewrite.
    pub fn resolve(&self, put_name: &str) -> Option<&HistoryEntry> {
        self.get(put_name)
            .or_else(|| self.get(&sanitized_object_name(put_name)))
    }

    /// Manifest objects that may belong to `logical_name`: those stored under
    /// its manifest name or the sanitized form of it, most recent first.
    ///
    /// Stored names are not unique per logical name, so callers must decode
    /// each candidate and check the name it records.
    pub fn manifests_named(&self, logical_name: &str) -> Vec<&HistoryEntry> {
        let exact = manifest_object_name(logical_name);
        let sanitized = sanitized_object_name(&exact);
        let mut out: Vec<&HistoryEntry> = self
            .manifests
            .iter()
            .filter(|e| e.name == exact || e.name == sanitized)
            .collect();
        out.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        out
    }

    /// Every scanned manifest object, duplicates included, most recent first.
    pub fn manifest_candidates(&self) -> Vec<&HistoryEntry> {
        let mut out: Vec<&HistoryEntry> = self.manifests.iter().collect();
        out.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        out
    }

    /// Number of history entries visited by the scan (duplicates included).
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
