use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix appended to a logical name to form its manifest object name.
pub const MANIFEST_SUFFIX: &str = "_metadata.json";

/// Extension carried by every chunk object name.
pub const CHUNK_EXTENSION: &str = "part";

/// Opaque identifier naming one chunk's attachment.
///
/// Always random (UUIDv4), never derived from the file name or content, so
/// concurrent uploads sharing a base name cannot address each other's chunks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkRef(String);

impl ChunkRef {
    /// Allocate a fresh, globally unique chunk identifier.
    pub fn generate() -> Self {
        ChunkRef(format!(
            "{}.{CHUNK_EXTENSION}",
            uuid::Uuid::new_v4().simple()
        ))
    }

    /// Wrap an identifier read back from a manifest.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        ChunkRef(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a backend channel: a scope (server, account, bucket prefix)
/// plus the channel name inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub scope: String,
    pub channel: String,
}

impl ChannelRef {
    pub fn new(scope: impl Into<String>, channel: impl Into<String>) -> Self {
        ChannelRef {
            scope: scope.into(),
            channel: channel.into(),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.channel)
    }
}

/// Normalize a user-supplied logical name: folders may be passed with a
/// trailing slash.
pub fn normalize_logical_name(name: &str) -> &str {
    name.trim_end_matches('/')
}

/// Manifest object name for a logical name, e.g. `report.pdf_metadata.json`.
pub fn manifest_object_name(logical_name: &str) -> String {
    format!("{}{MANIFEST_SUFFIX}", normalize_logical_name(logical_name))
}

/// Whether a backend object name follows the manifest naming convention.
pub fn is_manifest_object_name(name: &str) -> bool {
    name.ends_with(MANIFEST_SUFFIX)
}

/// The name a channel backend may rewrite an attachment to (spaces become
/// underscores).
pub fn sanitized_object_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Split a requested download path into its root logical name and the
/// remaining segments inside a folder (`proj/sub/b.txt` → `proj`, `[sub, b.txt]`).
pub fn split_requested_path(requested: &str) -> (&str, Vec<&str>) {
    let trimmed = normalize_logical_name(requested);
    let mut parts = trimmed.split('/');
    let root = parts.next().unwrap_or_default();
    let rest = parts.filter(|p| !p.is_empty()).collect();
    (root, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_refs_are_unique_and_name_independent() {
        let a = ChunkRef::generate();
        let b = ChunkRef::generate();
        assert_ne!(a, b);
        assert!(a.as_str().ends_with(".part"));
        // 32 hex chars + ".part"
        assert_eq!(a.as_str().len(), 32 + 1 + CHUNK_EXTENSION.len());
    }

    #[test]
    fn manifest_names() {
        assert_eq!(manifest_object_name("a.txt"), "a.txt_metadata.json");
        assert_eq!(manifest_object_name("proj/"), "proj_metadata.json");
        assert!(is_manifest_object_name("proj_metadata.json"));
        assert!(!is_manifest_object_name("0af3.part"));
    }

    #[test]
    fn sanitizes_spaces() {
        assert_eq!(
            sanitized_object_name("my report_metadata.json"),
            "my_report_metadata.json"
        );
    }

    #[test]
    fn splits_requested_path() {
        assert_eq!(split_requested_path("proj"), ("proj", vec![]));
        assert_eq!(split_requested_path("proj/"), ("proj", vec![]));
        assert_eq!(
            split_requested_path("proj/sub/b.txt"),
            ("proj", vec!["sub", "b.txt"])
        );
    }

    #[test]
    fn channel_ref_display() {
        assert_eq!(ChannelRef::new("guild-1", "vault").to_string(), "guild-1/vault");
    }
}
