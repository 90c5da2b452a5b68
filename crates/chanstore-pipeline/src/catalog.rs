//! Listing: every decodable manifest in the scanned window of a channel.

use chanstore_core::{ChannelRef, StoreResult};
use chanstore_storage::{BackendClient, BackendError, HistoryCache};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::PipelineConfig;
use crate::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File { size: u64 },
    Folder { files: usize },
}

/// One stored upload as seen through its manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub logical_name: String,
    pub kind: EntryKind,
    pub encrypted: bool,
    pub chunks: usize,
    /// Backend append position of the manifest; larger is more recent
    pub sequence: u64,
    pub manifest_object: String,
}

#[derive(Clone)]
pub struct CatalogPipeline {
    client: Arc<dyn BackendClient>,
    config: Arc<PipelineConfig>,
}

impl CatalogPipeline {
    pub fn new(client: Arc<dyn BackendClient>, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    /// List uploads in `channel`, one entry per manifest object, most recent
    /// first. Older uploads that share a stored name are listed too.
    /// Manifests that cannot be read or decoded are skipped with a warning.
    pub async fn list(&self, channel: &ChannelRef) -> StoreResult<Vec<CatalogEntry>> {
        let cache = HistoryCache::build(self.client.as_ref(), channel, self.config.page_cap).await?;

        let mut out = Vec::new();
        for candidate in cache.manifest_candidates() {
            let raw = match self.client.fetch(channel, &candidate.handle).await {
                Ok(raw) => raw,
                Err(e @ BackendError::Unavailable(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(manifest = %candidate.name, "skipping unreadable manifest: {e}");
                    continue;
                }
            };
            let manifest = match Manifest::decode(&raw, &self.config.cipher) {
                Ok(m) => m,
                Err(e) => {
                    warn!(manifest = %candidate.name, "skipping undecodable manifest: {e}");
                    continue;
                }
            };

            let kind = match &manifest {
                Manifest::File(m) => EntryKind::File { size: m.size },
                Manifest::Folder(m) => EntryKind::Folder {
                    files: m.files().len(),
                },
            };
            out.push(CatalogEntry {
                logical_name: manifest.logical_name().to_string(),
                kind,
                encrypted: manifest.encrypted(),
                chunks: manifest.all_chunks().len(),
                sequence: candidate.sequence,
                manifest_object: candidate.name.clone(),
            });
        }

        debug!(channel = %channel, entries = out.len(), "catalog listed");
        Ok(out)
    }
}
