//! chanstore-storage: the append-only backend contract and its implementations
//!
//! - `client`: the `BackendClient` trait pipelines are written against
//! - `cache`: one bounded history scan indexed by object name
//! - `memory`: in-process channel backend
//! - `channel`: channel emulated on any OpenDAL service
//! - `operator`: configuration-driven backend factory

pub mod cache;
pub mod channel;
pub mod client;
pub mod memory;
pub mod operator;

pub use cache::HistoryCache;
pub use channel::OpendalChannel;
pub use client::{
    BackendClient, BackendError, BackendResult, DeleteOutcome, HistoryEntry, HistoryStream,
    ObjectHandle,
};
pub use memory::MemoryBackend;
pub use operator::{build_backend, build_operator, S3Credentials};
