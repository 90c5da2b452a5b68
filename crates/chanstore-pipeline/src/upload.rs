//! Upload: optionally encrypt, split under the chunk limit, put every chunk
//! under a fresh random reference, and record them in a manifest.
//!
//! Single files put chunks first and the manifest last, so an interrupted
//! upload leaves orphaned chunks but never a manifest pointing at nothing.
//! Folders put the manifest first, then every chunk in path order.
//! Either way a mid-sequence failure is reported as
//! [`StoreError::PartialUpload`]; nothing already written is rolled back.

use bytes::Bytes;
use chanstore_core::types::{manifest_object_name, normalize_logical_name};
use chanstore_core::{ChannelRef, ChunkRef, StoreError, StoreResult};
use chanstore_storage::{BackendClient, ObjectHandle};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::context::{cipher_error, Pacer, PipelineConfig};
use crate::manifest::{validate_segment, FileManifest, FolderManifest, Manifest};

/// One file of a folder upload.
#[derive(Debug, Clone)]
pub struct FolderEntry {
    /// `/`-separated path relative to the folder root
    pub rel_path: String,
    pub data: Bytes,
}

impl FolderEntry {
    pub fn new(rel_path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            rel_path: rel_path.into(),
            data: data.into(),
        }
    }
}

/// Result of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub logical_name: String,
    pub manifest_name: String,
    pub manifest_handle: ObjectHandle,
    /// Plaintext bytes across all files
    pub bytes: u64,
    pub files: usize,
    pub chunks: usize,
    pub encrypted: bool,
}

#[derive(Clone)]
pub struct UploadPipeline {
    client: Arc<dyn BackendClient>,
    config: Arc<PipelineConfig>,
}

/// Chunks waiting to be put, in put order.
type PendingChunks = Vec<(ChunkRef, Bytes)>;

impl UploadPipeline {
    pub fn new(client: Arc<dyn BackendClient>, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    fn prepare(&self, data: Bytes, secure: bool) -> StoreResult<PendingChunks> {
        let payload = if secure {
            Bytes::from(self.config.cipher.encrypt(&data).map_err(cipher_error)?)
        } else {
            data
        };
        let parts = chanstore_chunks::split(payload, self.config.chunk_limit)?;
        Ok(assign_refs(parts))
    }

    /// Upload one file's bytes under `logical_name`.
    pub async fn upload_file(
        &self,
        channel: &ChannelRef,
        logical_name: &str,
        data: Bytes,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        let logical_name = normalize_logical_name(logical_name);
        validate_segment(logical_name)?;

        let size = data.len() as u64;
        let pending = self.prepare(data, secure)?;
        self.store_file(channel, logical_name, size, pending, secure)
            .await
    }

    /// Put prepared chunks, then the file manifest recording them.
    async fn store_file(
        &self,
        channel: &ChannelRef,
        logical_name: &str,
        size: u64,
        pending: PendingChunks,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        let chunk_count = pending.len();
        let manifest = Manifest::File(FileManifest {
            original_filename: logical_name.to_string(),
            size,
            encrypted: secure,
            chunks: pending.iter().map(|(r, _)| r.clone()).collect(),
        });
        let manifest_bytes = Bytes::from(manifest.encode(&self.config.cipher)?);
        let manifest_name = manifest_object_name(logical_name);

        let mut pacer = Pacer::new(self.config.put_delay);
        let mut written = 0usize;
        for (chunk_ref, part) in pending {
            pacer.wait().await;
            if let Err(e) = self.client.put(channel, chunk_ref.as_str(), part).await {
                return Err(partial(logical_name, written, false, e.into()));
            }
            written += 1;
            debug!(name = %logical_name, chunk = %chunk_ref, index = written, "chunk stored");
        }

        pacer.wait().await;
        let manifest_handle = self
            .client
            .put(channel, &manifest_name, manifest_bytes)
            .await
            .map_err(|e| partial(logical_name, written, false, e.into()))?;

        info!(
            name = %logical_name,
            channel = %channel,
            bytes = size,
            chunks = chunk_count,
            encrypted = secure,
            "file uploaded"
        );
        Ok(UploadReport {
            logical_name: logical_name.to_string(),
            manifest_name,
            manifest_handle,
            bytes: size,
            files: 1,
            chunks: chunk_count,
            encrypted: secure,
        })
    }

    /// Read a local file and upload it, named after its file name unless
    /// `logical_name` is given.
    ///
    /// Plaintext uploads are chunked while reading; secure uploads need the
    /// whole payload to seal it first.
    pub async fn upload_path(
        &self,
        channel: &ChannelRef,
        path: &Path,
        logical_name: Option<&str>,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        let name = match logical_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?
                .to_string(),
        };
        if secure {
            let data = tokio::fs::read(path).await?;
            return self
                .upload_file(channel, &name, Bytes::from(data), secure)
                .await;
        }

        let logical_name = normalize_logical_name(&name);
        validate_segment(logical_name)?;
        let file = tokio::fs::File::open(path).await?.into_std().await;
        let limit = self.config.chunk_limit;
        let parts = tokio::task::spawn_blocking(move || {
            chanstore_chunks::split_reader(std::io::BufReader::new(file), limit)
        })
        .await
        .map_err(|e| anyhow::anyhow!("read task failed: {e}"))??;
        let size = parts.iter().map(|p| p.len() as u64).sum();
        self.store_file(channel, logical_name, size, assign_refs(parts), false)
            .await
    }

    /// Upload a set of files as one folder under `folder_name`.
    pub async fn upload_folder(
        &self,
        channel: &ChannelRef,
        folder_name: &str,
        mut entries: Vec<FolderEntry>,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        let folder_name = normalize_logical_name(folder_name);
        validate_segment(folder_name)?;
        entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        let mut folder = FolderManifest::new(folder_name, secure);
        let mut pending: PendingChunks = Vec::new();
        let mut total = 0u64;
        let files = entries.len();
        for entry in entries {
            let size = entry.data.len() as u64;
            let chunks = self.prepare(entry.data, secure)?;
            folder.insert_file(
                &entry.rel_path,
                chunks.iter().map(|(r, _)| r.clone()).collect(),
                size,
            )?;
            total += size;
            pending.extend(chunks);
        }

        let manifest_bytes = Bytes::from(Manifest::Folder(folder).encode(&self.config.cipher)?);
        let manifest_name = manifest_object_name(folder_name);
        let chunk_count = pending.len();

        let mut pacer = Pacer::new(self.config.put_delay);
        pacer.wait().await;
        let manifest_handle = self
            .client
            .put(channel, &manifest_name, manifest_bytes)
            .await
            .map_err(StoreError::from)?;

        let mut written = 0usize;
        for (chunk_ref, part) in pending {
            pacer.wait().await;
            if let Err(e) = self.client.put(channel, chunk_ref.as_str(), part).await {
                return Err(partial(folder_name, written, true, e.into()));
            }
            written += 1;
        }

        info!(
            name = %folder_name,
            channel = %channel,
            files,
            bytes = total,
            chunks = chunk_count,
            encrypted = secure,
            "folder uploaded"
        );
        Ok(UploadReport {
            logical_name: folder_name.to_string(),
            manifest_name,
            manifest_handle,
            bytes: total,
            files,
            chunks: chunk_count,
            encrypted: secure,
        })
    }
}

fn assign_refs(parts: Vec<Bytes>) -> PendingChunks {
    parts
        .into_iter()
        .map(|part| (ChunkRef::generate(), part))
        .collect()
}

fn partial(
    name: &str,
    chunks_written: usize,
    manifest_written: bool,
    source: StoreError,
) -> StoreError {
    if chunks_written == 0 && !manifest_written {
        return source;
    }
    error!(
        logical_name = %name,
        chunks_written,
        manifest_written,
        error = %source,
        "upload interrupted; written objects are orphaned"
    );
    StoreError::PartialUpload {
        name: name.to_string(),
        chunks_written,
        manifest_written,
        source: Box::new(source),
    }
}
