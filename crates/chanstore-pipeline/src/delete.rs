//! Delete: find the most recent manifest whose decoded logical name matches,
//! then remove the manifest and every chunk it references.
//!
//! Matching is by manifest content, not object name, so renamed or
//! sanitized manifest objects are still found. One history scan serves both
//! the manifest search and chunk resolution.

use chanstore_core::{ChannelRef, StoreError, StoreResult};
use chanstore_storage::{
    BackendClient, BackendError, DeleteOutcome, HistoryCache, HistoryEntry, ObjectHandle,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::{Pacer, PipelineConfig};
use crate::manifest::Manifest;

/// What a delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub manifest_deleted: bool,
    pub chunks_deleted: usize,
    /// Referenced chunks absent from history or already gone
    pub chunks_missing: usize,
    /// Deletes that failed with a backend error
    pub failures: usize,
}

#[derive(Clone)]
pub struct DeletePipeline {
    client: Arc<dyn BackendClient>,
    config: Arc<PipelineConfig>,
}

impl DeletePipeline {
    pub fn new(client: Arc<dyn BackendClient>, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    /// Delete `logical_name`. `Ok(false)` means no manifest matched.
    pub async fn delete(&self, channel: &ChannelRef, logical_name: &str) -> StoreResult<bool> {
        Ok(self.delete_with_report(channel, logical_name).await?.is_some())
    }

    /// Delete `logical_name` and report what was removed, or `None` when no
    /// manifest matched.
    ///
    /// Individual delete failures are logged and counted; only an
    /// unreachable channel aborts.
    pub async fn delete_with_report(
        &self,
        channel: &ChannelRef,
        logical_name: &str,
    ) -> StoreResult<Option<DeleteReport>> {
        let cache = HistoryCache::build(self.client.as_ref(), channel, self.config.page_cap).await?;

        let found = self.find_manifest(channel, &cache, logical_name).await?;
        let Some((entry, manifest)) = found else {
            info!(name = logical_name, channel = %channel, "nothing to delete");
            return Ok(None);
        };

        let mut report = DeleteReport::default();
        let mut pacer = Pacer::new(self.config.delete_delay);

        pacer.wait().await;
        // a manifest that vanished since the scan still counts as removed
        self.remove(channel, &entry.handle, &mut report).await?;
        report.manifest_deleted = true;

        for chunk in manifest.all_chunks() {
            let Some(chunk_entry) = cache.resolve(chunk.as_str()) else {
                warn!(chunk = %chunk, "referenced chunk not in history; skipping");
                report.chunks_missing += 1;
                continue;
            };
            pacer.wait().await;
            self.remove(channel, &chunk_entry.handle, &mut report).await?;
        }

        info!(
            name = logical_name,
            channel = %channel,
            chunks_deleted = report.chunks_deleted,
            chunks_missing = report.chunks_missing,
            failures = report.failures,
            "delete complete"
        );
        Ok(Some(report))
    }

    /// Most recent manifest in `cache` whose decoded name is `logical_name`.
    async fn find_manifest(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        logical_name: &str,
    ) -> StoreResult<Option<(HistoryEntry, Manifest)>> {
        for candidate in cache.manifest_candidates() {
            let raw = match self.client.fetch(channel, &candidate.handle).await {
                Ok(raw) => raw,
                Err(BackendError::Unavailable(e)) => return Err(StoreError::BackendUnavailable(e)),
                Err(e) => {
                    warn!(manifest = %candidate.name, "skipping unreadable manifest: {e}");
                    continue;
                }
            };
            match Manifest::decode(&raw, &self.config.cipher) {
                Ok(manifest) if manifest.matches(logical_name) => {
                    debug!(
                        manifest = %candidate.name,
                        sequence = candidate.sequence,
                        "delete target found"
                    );
                    return Ok(Some((candidate.clone(), manifest)));
                }
                Ok(_) => {}
                Err(e) => warn!(manifest = %candidate.name, "skipping undecodable manifest: {e}"),
            }
        }
        Ok(None)
    }

    async fn remove(
        &self,
        channel: &ChannelRef,
        handle: &ObjectHandle,
        report: &mut DeleteReport,
    ) -> StoreResult<()> {
        match self.client.delete(channel, handle).await {
            Ok(DeleteOutcome::Deleted) => {
                if report.manifest_deleted {
                    report.chunks_deleted += 1;
                }
            }
            Ok(DeleteOutcome::NotFound) => {
                debug!(handle = %handle, "object already gone");
                if report.manifest_deleted {
                    report.chunks_missing += 1;
                }
            }
            Err(BackendError::Unavailable(e)) => return Err(StoreError::BackendUnavailable(e)),
            Err(e) => {
                error!(handle = %handle, "delete failed: {e}");
                report.failures += 1;
            }
        }
        Ok(())
    }
}
