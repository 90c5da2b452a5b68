//! Download: locate a manifest by name, resolve its chunk references through
//! one history scan, reassemble, decrypt, and write the result.
//!
//! Files are assembled in a temporary sibling and renamed into place, so a
//! failed download never leaves partial output behind. Folders are staged
//! in a scratch directory, packed into `{folder}.zip`, and the staging
//! directory is removed whether or not packing succeeded.

use chanstore_core::types::split_requested_path;
use chanstore_core::{ChannelRef, ChunkRef, StoreError, StoreResult};
use chanstore_storage::{BackendClient, HistoryCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::archive;
use crate::context::{cipher_error, PipelineConfig};
use crate::manifest::{validate_segment, FolderManifest, Manifest, TreeNode};

/// Where a download landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutput {
    File { path: PathBuf, bytes: u64 },
    Archive { path: PathBuf, files: usize, bytes: u64 },
}

impl DownloadOutput {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutput::File { path, .. } | DownloadOutput::Archive { path, .. } => path,
        }
    }
}

/// A single file to reassemble.
#[derive(Debug, Clone)]
struct FileTarget {
    name: String,
    chunks: Vec<ChunkRef>,
    size: Option<u64>,
    encrypted: bool,
}

#[derive(Debug)]
enum Target {
    File(FileTarget),
    Folder(FolderManifest),
}

#[derive(Clone)]
pub struct DownloadPipeline {
    client: Arc<dyn BackendClient>,
    config: Arc<PipelineConfig>,
}

impl DownloadPipeline {
    pub fn new(client: Arc<dyn BackendClient>, config: Arc<PipelineConfig>) -> Self {
        Self { client, config }
    }

    /// Download `requested` into the configured data directory.
    pub async fn download(
        &self,
        channel: &ChannelRef,
        requested: &str,
    ) -> StoreResult<DownloadOutput> {
        let dir = self.config.data_dir.clone();
        self.download_to(channel, requested, &dir).await
    }

    /// Download `requested` into `dest_dir`.
    ///
    /// `requested` is a logical name, or `folder/sub/path` to address a file
    /// or directory inside an uploaded folder. Directories come back as a
    /// zip archive.
    pub async fn download_to(
        &self,
        channel: &ChannelRef,
        requested: &str,
        dest_dir: &Path,
    ) -> StoreResult<DownloadOutput> {
        let (cache, target) = self.resolve(channel, requested).await?;
        tokio::fs::create_dir_all(dest_dir).await?;

        let output = match target {
            Target::File(file) => {
                let path = dest_dir.join(&file.name);
                let bytes = self.write_file(channel, &cache, &file, &path).await?;
                DownloadOutput::File { path, bytes }
            }
            Target::Folder(folder) => self.write_archive(channel, &cache, &folder, dest_dir).await?,
        };

        info!(
            requested,
            channel = %channel,
            path = %output.path().display(),
            "download complete"
        );
        Ok(output)
    }

    /// Reassemble a single file in memory.
    ///
    /// Folders cannot be returned this way; address a file inside them or use
    /// [`DownloadPipeline::download_to`].
    pub async fn fetch_bytes(&self, channel: &ChannelRef, requested: &str) -> StoreResult<Vec<u8>> {
        let (cache, target) = self.resolve(channel, requested).await?;
        let Target::File(file) = target else {
            return Err(StoreError::InvalidPath(format!(
                "'{requested}' is a folder; download it as an archive"
            )));
        };

        let mut sealed = Vec::new();
        for chunk in &file.chunks {
            sealed.extend_from_slice(&self.fetch_chunk(channel, &cache, chunk).await?);
        }
        let plain = if file.encrypted {
            self.config.cipher.decrypt(&sealed).map_err(cipher_error)?
        } else {
            sealed
        };
        check_size(&file, plain.len() as u64)?;
        Ok(plain)
    }

    async fn resolve(
        &self,
        channel: &ChannelRef,
        requested: &str,
    ) -> StoreResult<(HistoryCache, Target)> {
        let (root, rest) = split_requested_path(requested);
        if root.is_empty() {
            return Err(StoreError::InvalidPath("empty name".into()));
        }

        let cache = HistoryCache::build(self.client.as_ref(), channel, self.config.page_cap).await?;
        let manifest = self.find_manifest(channel, &cache, root).await?;

        let target = match manifest {
            Manifest::File(m) if rest.is_empty() => Target::File(FileTarget {
                name: m.original_filename,
                chunks: m.chunks,
                size: Some(m.size),
                encrypted: m.encrypted,
            }),
            Manifest::File(_) => {
                return Err(StoreError::NotFound(format!(
                    "'{root}' is a file and has no entry '{}'",
                    rest.join("/")
                )))
            }
            Manifest::Folder(folder) if rest.is_empty() => Target::Folder(folder),
            Manifest::Folder(folder) => {
                let leaf = rest[rest.len() - 1].to_string();
                match folder.node_at(&rest) {
                    Some(TreeNode::File { chunks, size }) => Target::File(FileTarget {
                        name: leaf,
                        chunks: chunks.clone(),
                        size: *size,
                        encrypted: folder.encrypted,
                    }),
                    Some(TreeNode::Directory { children }) => Target::Folder(FolderManifest {
                        folder_name: leaf,
                        encrypted: folder.encrypted,
                        tree: children.clone(),
                    }),
                    None => {
                        return Err(StoreError::NotFound(format!(
                            "'{}' not found in folder '{root}'",
                            rest.join("/")
                        )))
                    }
                }
            }
        };
        Ok((cache, target))
    }

    /// Most recent manifest stored under `root`'s object name (or its
    /// sanitized form) that actually records `root` as its logical name.
    ///
    /// With no match, the first decode failure is returned if there was one,
    /// otherwise `NotFound`.
    async fn find_manifest(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        root: &str,
    ) -> StoreResult<Manifest> {
        let mut first_err = None;
        for entry in cache.manifests_named(root) {
            let raw = self.client.fetch(channel, &entry.handle).await?;
            match Manifest::decode(&raw, &self.config.cipher) {
                Ok(manifest) if manifest.matches(root) => {
                    debug!(
                        root,
                        manifest = %entry.name,
                        sequence = entry.sequence,
                        encrypted = manifest.encrypted(),
                        "manifest resolved"
                    );
                    return Ok(manifest);
                }
                Ok(other) => debug!(
                    root,
                    manifest = %entry.name,
                    recorded = other.logical_name(),
                    "manifest belongs to another name"
                ),
                Err(e) => {
                    warn!(manifest = %entry.name, "undecodable manifest: {e}");
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| {
            StoreError::NotFound(format!(
                "no manifest for '{root}' in the last {} objects of {channel}",
                self.config.page_cap
            ))
        }))
    }

    async fn fetch_chunk(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        chunk: &ChunkRef,
    ) -> StoreResult<bytes::Bytes> {
        let entry = cache.resolve(chunk.as_str()).ok_or_else(|| {
            StoreError::NotFound(format!("chunk {chunk} missing from channel history"))
        })?;
        Ok(self.client.fetch(channel, &entry.handle).await?)
    }

    /// Reassemble `file` at `dest`. Nothing is left at `dest` on failure.
    async fn write_file(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        file: &FileTarget,
        dest: &Path,
    ) -> StoreResult<u64> {
        validate_segment(&file.name)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = tmp_path(dest);
        match self.assemble(channel, cache, file, &tmp).await {
            Ok(bytes) => {
                tokio::fs::rename(&tmp, dest).await?;
                Ok(bytes)
            }
            Err(e) => {
                remove_quietly(&tmp).await;
                Err(e)
            }
        }
    }

    async fn assemble(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        file: &FileTarget,
        tmp: &Path,
    ) -> StoreResult<u64> {
        let mut out = tokio::fs::File::create(tmp).await?;
        let mut written = 0u64;
        for chunk in &file.chunks {
            let part = self.fetch_chunk(channel, cache, chunk).await?;
            out.write_all(&part).await?;
            written += part.len() as u64;
        }
        out.flush().await?;
        drop(out);

        if file.encrypted {
            let sealed = tokio::fs::read(tmp).await?;
            let plain = self.config.cipher.decrypt(&sealed).map_err(cipher_error)?;
            tokio::fs::write(tmp, &plain).await?;
            written = plain.len() as u64;
        }

        check_size(file, written)?;
        Ok(written)
    }

    async fn write_archive(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        folder: &FolderManifest,
        dest_dir: &Path,
    ) -> StoreResult<DownloadOutput> {
        validate_segment(&folder.folder_name)?;
        let staging = dest_dir.join(format!(
            ".{}.staging-{}",
            folder.folder_name,
            uuid::Uuid::new_v4().simple()
        ));
        let archive_path = dest_dir.join(format!("{}.zip", folder.folder_name));

        let result = async {
            let (files, bytes) = self.stage_folder(channel, cache, folder, &staging).await?;
            let src = staging.clone();
            let dst = archive_path.clone();
            tokio::task::spawn_blocking(move || archive::zip_directory(&src, &dst))
                .await
                .map_err(|e| StoreError::Other(anyhow::anyhow!("archive task failed: {e}")))??;
            Ok::<_, StoreError>((files, bytes))
        }
        .await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staging.display(), "failed to remove staging directory: {e}");
            }
        }

        let (files, bytes) = result?;
        Ok(DownloadOutput::Archive {
            path: archive_path,
            files,
            bytes,
        })
    }

    /// Rebuild the folder tree on disk under `staging`.
    async fn stage_folder(
        &self,
        channel: &ChannelRef,
        cache: &HistoryCache,
        folder: &FolderManifest,
        staging: &Path,
    ) -> StoreResult<(usize, u64)> {
        tokio::fs::create_dir_all(staging).await?;

        let files = folder.files();
        let mut total = 0u64;
        for leaf in &files {
            let dest = safe_join(staging, &leaf.path)?;
            let target = FileTarget {
                name: leaf.path.rsplit('/').next().unwrap_or_default().to_string(),
                chunks: leaf.chunks.to_vec(),
                size: leaf.size,
                encrypted: folder.encrypted,
            };
            total += self.write_file(channel, cache, &target, &dest).await?;
        }
        for dir in folder.empty_dirs() {
            tokio::fs::create_dir_all(safe_join(staging, &dir)?).await?;
        }
        Ok((files.len(), total))
    }
}

fn check_size(file: &FileTarget, actual: u64) -> StoreResult<()> {
    match file.size {
        Some(expected) if expected != actual => Err(StoreError::CorruptManifest(format!(
            "'{}': manifest records {expected} bytes, reassembled {actual}",
            file.name
        ))),
        _ => Ok(()),
    }
}

/// Join a `/`-separated relative path under `base`, refusing traversal.
fn safe_join(base: &Path, rel: &str) -> StoreResult<PathBuf> {
    let mut out = base.to_path_buf();
    for segment in rel.split('/') {
        validate_segment(segment)?;
        out.push(segment);
    }
    Ok(out)
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".chanstore_tmp");
    dest.with_file_name(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "failed to remove partial output: {e}");
        }
    }
}
