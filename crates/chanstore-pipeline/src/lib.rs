//! chanstore-pipeline: upload, download, delete, and listing over an
//! append-only channel backend
//!
//! - `manifest`: manifest wire format and dual-mode decoding
//! - `upload` / `download` / `delete` / `catalog`: one pipeline per operation
//! - `store`: the pipelines bound to one backend and config
//! - `dispatch`: blocking job front on a dedicated runtime thread
//! - `collect` / `archive`: local folder gathering and zip packaging

pub mod archive;
pub mod catalog;
pub mod collect;
pub mod context;
pub mod delete;
pub mod dispatch;
pub mod download;
pub mod manifest;
pub mod store;
pub mod upload;

pub use catalog::{CatalogEntry, CatalogPipeline, EntryKind};
pub use collect::collect_folder;
pub use context::{resolve_key, PipelineConfig};
pub use delete::{DeletePipeline, DeleteReport};
pub use dispatch::{Dispatcher, Job, JobOutput, PendingJob};
pub use download::{DownloadOutput, DownloadPipeline};
pub use manifest::{FileManifest, FolderManifest, Manifest, TreeNode};
pub use store::ChannelStore;
pub use upload::{FolderEntry, UploadPipeline, UploadReport};
