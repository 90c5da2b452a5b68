//! chanstore-core: shared types, configuration schema, and the error taxonomy
//! used by every chanstore pipeline.

pub mod config;
pub mod error;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use types::{ChannelRef, ChunkRef};
