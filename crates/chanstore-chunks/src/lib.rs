//! chanstore-chunks: splits payloads into backend-sized parts and rejoins them
//!
//! Chunk boundaries depend only on the size limit, never on content, so
//! `join(split(x, limit)) == x` holds for every payload. Chunk identifiers are
//! assigned by the upload pipeline, not here.

pub mod chunker;

pub use chunker::{join, split, split_reader};
