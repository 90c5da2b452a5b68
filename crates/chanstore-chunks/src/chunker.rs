//! Fixed-limit chunking
//!
//! Every backend object has a hard size ceiling, so payloads are cut into
//! consecutive parts of at most `limit` bytes. Only the last part may be
//! shorter. An empty payload still yields exactly one (empty) part so every
//! logical file maps to at least one chunk.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::io::Read;

/// Split `data` into parts of at most `limit` bytes.
///
/// Parts share the underlying buffer (`Bytes::slice`), no copy is made.
pub fn split(data: Bytes, limit: usize) -> Result<Vec<Bytes>> {
    if limit == 0 {
        anyhow::bail!("chunk limit must be greater than zero");
    }
    if data.is_empty() {
        return Ok(vec![Bytes::new()]);
    }

    let mut parts = Vec::with_capacity(data.len().div_ceil(limit));
    let mut offset = 0;
    while offset < data.len() {
        let end = usize::min(offset + limit, data.len());
        parts.push(data.slice(offset..end));
        offset = end;
    }

    tracing::debug!(bytes = data.len(), limit, parts = parts.len(), "split payload");
    Ok(parts)
}

/// Split a byte stream into parts of at most `limit` bytes, reading it
/// incrementally instead of requiring the whole payload in memory first.
pub fn split_reader<R: Read>(mut reader: R, limit: usize) -> Result<Vec<Bytes>> {
    if limit == 0 {
        anyhow::bail!("chunk limit must be greater than zero");
    }

    let mut parts = Vec::new();
    loop {
        let mut buf = Vec::with_capacity(limit.min(64 * 1024));
        let n = (&mut reader)
            .take(limit as u64)
            .read_to_end(&mut buf)
            .with_context(|| format!("reading chunk {}", parts.len()))?;
        if n == 0 {
            break;
        }
        parts.push(Bytes::from(buf));
        if n < limit {
            break;
        }
    }

    if parts.is_empty() {
        parts.push(Bytes::new());
    }
    Ok(parts)
}

/// Concatenate parts in the given order. Inverse of [`split`].
pub fn join<I, B>(parts: I) -> Vec<u8>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}
