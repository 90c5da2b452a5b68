//! `ChannelStore`: the four pipelines bound to one backend and one config.

use bytes::Bytes;
use chanstore_core::config::ChanstoreConfig;
use chanstore_core::{ChannelRef, StoreResult};
use chanstore_storage::BackendClient;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::{CatalogEntry, CatalogPipeline};
use crate::context::PipelineConfig;
use crate::delete::DeletePipeline;
use crate::download::{DownloadOutput, DownloadPipeline};
use crate::upload::{FolderEntry, UploadPipeline, UploadReport};

/// Cheap to clone; every clone shares the backend and configuration.
#[derive(Clone)]
pub struct ChannelStore {
    upload: UploadPipeline,
    download: DownloadPipeline,
    delete: DeletePipeline,
    catalog: CatalogPipeline,
}

impl ChannelStore {
    pub fn new(client: Arc<dyn BackendClient>, config: PipelineConfig) -> StoreResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            upload: UploadPipeline::new(client.clone(), config.clone()),
            download: DownloadPipeline::new(client.clone(), config.clone()),
            delete: DeletePipeline::new(client.clone(), config.clone()),
            catalog: CatalogPipeline::new(client, config),
        })
    }

    /// Resolve the key, build the configured backend, and wire the pipelines.
    pub fn from_config(cfg: &ChanstoreConfig) -> StoreResult<Self> {
        let config = PipelineConfig::from_config(cfg)?;
        let client = chanstore_storage::build_backend(&cfg.backend)?;
        Self::new(client, config)
    }

    pub fn uploads(&self) -> &UploadPipeline {
        &self.upload
    }

    pub fn downloads(&self) -> &DownloadPipeline {
        &self.download
    }

    pub async fn upload_file(
        &self,
        channel: &ChannelRef,
        logical_name: &str,
        data: Bytes,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        self.upload
            .upload_file(channel, logical_name, data, secure)
            .await
    }

    pub async fn upload_folder(
        &self,
        channel: &ChannelRef,
        folder_name: &str,
        entries: Vec<FolderEntry>,
        secure: bool,
    ) -> StoreResult<UploadReport> {
        self.upload
            .upload_folder(channel, folder_name, entries, secure)
            .await
    }

    /// Collect a local directory and upload it as a folder named after it.
    pub async fn upload_dir(
        &self,
        channel: &ChannelRef,
        dir: &Path,
        excludes: &[String],
        secure: bool,
    ) -> StoreResult<UploadReport> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| chanstore_core::StoreError::InvalidPath(dir.display().to_string()))?
            .to_string();
        let root = dir.to_path_buf();
        let excludes = excludes.to_vec();
        let entries =
            tokio::task::spawn_blocking(move || crate::collect::collect_folder(&root, &excludes))
                .await
                .map_err(|e| anyhow::anyhow!("collect task failed: {e}"))??;
        self.upload_folder(channel, &name, entries, secure).await
    }

    pub async fn download(
        &self,
        channel: &ChannelRef,
        requested: &str,
    ) -> StoreResult<DownloadOutput> {
        self.download.download(channel, requested).await
    }

    pub async fn delete(&self, channel: &ChannelRef, logical_name: &str) -> StoreResult<bool> {
        self.delete.delete(channel, logical_name).await
    }

    pub async fn list(&self, channel: &ChannelRef) -> StoreResult<Vec<CatalogEntry>> {
        self.catalog.list(channel).await
    }
}
