//! Manifests: the per-upload JSON record naming every chunk of a file or
//! folder, stored as `{logical_name}_metadata.json`.
//!
//! Wire shapes:
//! ```text
//! file:   {"upload_type":"file","original_filename":..,"size":..,"encrypted":..,"chunks":[..]}
//! folder: {"upload_type":"folder","folder_name":..,"encrypted":..,"tree":{name: node}}
//! node:   {"type":"file","chunks":[..],"size":..} | {"type":"directory","children":{..}}
//! ```
//! `upload_type` may be absent on file manifests written by older uploaders.
//! Secure uploads store the JSON encrypted with the process key; decoding
//! tries ciphertext first and then plaintext.

use chanstore_core::types::normalize_logical_name;
use chanstore_core::{ChunkRef, StoreError, StoreResult};
use chanstore_crypto::Cipher;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::context::cipher_error;

/// Manifest of a single uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub original_filename: String,
    /// Plaintext size in bytes
    pub size: u64,
    pub encrypted: bool,
    /// Chunk references in reassembly order
    pub chunks: Vec<ChunkRef>,
}

/// A node in a folder manifest's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    File {
        chunks: Vec<ChunkRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Directory {
        children: BTreeMap<String, TreeNode>,
    },
}

/// Manifest of an uploaded folder. `tree` holds the folder's children; the
/// folder itself is `folder_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderManifest {
    pub folder_name: String,
    pub encrypted: bool,
    pub tree: BTreeMap<String, TreeNode>,
}

/// One leaf of a folder tree, flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderFile<'a> {
    /// `/`-separated path relative to the folder root
    pub path: String,
    pub chunks: &'a [ChunkRef],
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "upload_type", rename_all = "lowercase")]
pub enum Manifest {
    File(FileManifest),
    Folder(FolderManifest),
}

/// Reject path segments that cannot be materialized safely under a
/// destination directory.
pub fn validate_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0')
    {
        return Err(StoreError::InvalidPath(format!(
            "invalid path segment: {segment:?}"
        )));
    }
    Ok(())
}

impl FolderManifest {
    pub fn new(folder_name: impl Into<String>, encrypted: bool) -> Self {
        Self {
            folder_name: folder_name.into(),
            encrypted,
            tree: BTreeMap::new(),
        }
    }

    /// Insert a file at `rel_path` (`/`-separated), creating intermediate
    /// directories. Fails if the path collides with an existing node.
    pub fn insert_file(
        &mut self,
        rel_path: &str,
        chunks: Vec<ChunkRef>,
        size: u64,
    ) -> StoreResult<()> {
        let segments: Vec<&str> = rel_path.split('/').collect();
        for segment in &segments {
            validate_segment(segment)?;
        }
        let Some((leaf, dirs)) = segments.split_last() else {
            return Err(StoreError::InvalidPath(rel_path.to_string()));
        };

        let mut level = &mut self.tree;
        for dir in dirs {
            let node = level
                .entry((*dir).to_string())
                .or_insert_with(|| TreeNode::Directory {
                    children: BTreeMap::new(),
                });
            level = match node {
                TreeNode::Directory { children } => children,
                TreeNode::File { .. } => {
                    return Err(StoreError::InvalidPath(format!(
                        "{rel_path}: '{dir}' is a file"
                    )))
                }
            };
        }

        if level.contains_key(*leaf) {
            return Err(StoreError::InvalidPath(format!(
                "{rel_path}: duplicate entry"
            )));
        }
        level.insert(
            (*leaf).to_string(),
            TreeNode::File {
                chunks,
                size: Some(size),
            },
        );
        Ok(())
    }

    /// The node at `segments` below the folder root.
    pub fn node_at(&self, segments: &[&str]) -> Option<&TreeNode> {
        let (first, rest) = segments.split_first()?;
        let mut node = self.tree.get(*first)?;
        for segment in rest {
            node = match node {
                TreeNode::Directory { children } => children.get(*segment)?,
                TreeNode::File { .. } => return None,
            };
        }
        Some(node)
    }

    /// Every file in the tree with its relative path, in path order.
    pub fn files(&self) -> Vec<FolderFile<'_>> {
        let mut out = Vec::new();
        walk(&self.tree, "", &mut out);
        out
    }

    /// Every empty directory, as relative paths.
    pub fn empty_dirs(&self) -> Vec<String> {
        let mut out = Vec::new();
        walk_empty(&self.tree, "", &mut out);
        out
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn walk<'a>(level: &'a BTreeMap<String, TreeNode>, prefix: &str, out: &mut Vec<FolderFile<'a>>) {
    for (name, node) in level {
        let path = join_path(prefix, name);
        match node {
            TreeNode::File { chunks, size } => out.push(FolderFile {
                path,
                chunks,
                size: *size,
            }),
            TreeNode::Directory { children } => walk(children, &path, out),
        }
    }
}

fn walk_empty(level: &BTreeMap<String, TreeNode>, prefix: &str, out: &mut Vec<String>) {
    for (name, node) in level {
        if let TreeNode::Directory { children } = node {
            let path = join_path(prefix, name);
            if children.is_empty() {
                out.push(path);
            } else {
                walk_empty(children, &path, out);
            }
        }
    }
}

impl Manifest {
    /// The logical name this manifest was uploaded under.
    pub fn logical_name(&self) -> &str {
        match self {
            Manifest::File(m) => &m.original_filename,
            Manifest::Folder(m) => &m.folder_name,
        }
    }

    pub fn encrypted(&self) -> bool {
        match self {
            Manifest::File(m) => m.encrypted,
            Manifest::Folder(m) => m.encrypted,
        }
    }

    /// Whether this manifest answers to `name` (trailing `/` ignored).
    pub fn matches(&self, name: &str) -> bool {
        normalize_logical_name(self.logical_name()) == normalize_logical_name(name)
    }

    /// Every chunk reference, flattened across a folder tree.
    pub fn all_chunks(&self) -> Vec<ChunkRef> {
        match self {
            Manifest::File(m) => m.chunks.clone(),
            Manifest::Folder(m) => m
                .files()
                .into_iter()
                .flat_map(|f| f.chunks.iter().cloned())
                .collect(),
        }
    }

    /// Serialize, encrypting with `cipher` when the upload was secure.
    pub fn encode(&self, cipher: &Cipher) -> StoreResult<Vec<u8>> {
        let json = serde_json::to_vec(self)
            .map_err(|e| StoreError::Other(anyhow::anyhow!("serializing manifest: {e}")))?;
        if self.encrypted() {
            cipher.encrypt(&json).map_err(cipher_error)
        } else {
            Ok(json)
        }
    }

    /// Parse manifest bytes of either form.
    ///
    /// Branch one decrypts and parses. If decryption or parsing fails, branch
    /// two parses the raw bytes as plaintext. Failing both is
    /// [`StoreError::CorruptManifest`].
    pub fn decode(bytes: &[u8], cipher: &Cipher) -> StoreResult<Manifest> {
        let encrypted_err = match cipher.decrypt(bytes) {
            Ok(plain) => match serde_json::from_slice::<Manifest>(&plain) {
                Ok(manifest) => return Ok(manifest),
                Err(e) => format!("decrypted but unparseable: {e}"),
            },
            Err(e) => e.to_string(),
        };
        debug!(reason = %encrypted_err, "manifest is not ciphertext, trying plaintext");

        serde_json::from_slice::<Manifest>(bytes).map_err(|plain_err| {
            StoreError::CorruptManifest(format!(
                "not ciphertext ({encrypted_err}) and not plaintext JSON ({plain_err})"
            ))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UploadType {
    #[default]
    File,
    Folder,
}

/// Every field any manifest version may carry.
#[derive(Deserialize)]
struct WireManifest {
    #[serde(default)]
    upload_type: UploadType,
    original_filename: Option<String>,
    #[serde(alias = "original_size")]
    size: Option<u64>,
    chunks: Option<Vec<ChunkRef>>,
    folder_name: Option<String>,
    tree: Option<BTreeMap<String, TreeNode>>,
    #[serde(default)]
    encrypted: bool,
}

impl TryFrom<WireManifest> for Manifest {
    type Error = String;

    fn try_from(w: WireManifest) -> Result<Self, Self::Error> {
        match w.upload_type {
            UploadType::File => Ok(Manifest::File(FileManifest {
                original_filename: w
                    .original_filename
                    .ok_or("file manifest without original_filename")?,
                size: w.size.ok_or("file manifest without size")?,
                encrypted: w.encrypted,
                chunks: w.chunks.ok_or("file manifest without chunks")?,
            })),
            UploadType::Folder => Ok(Manifest::Folder(FolderManifest {
                folder_name: w.folder_name.ok_or("folder manifest without folder_name")?,
                encrypted: w.encrypted,
                tree: w.tree.ok_or("folder manifest without tree")?,
            })),
        }
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireManifest::deserialize(deserializer)?;
        Manifest::try_from(wire).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanstore_crypto::CipherKey;

    fn cipher() -> Cipher {
        Cipher::new(CipherKey::generate())
    }

    fn file_manifest(encrypted: bool) -> Manifest {
        Manifest::File(FileManifest {
            original_filename: "report.pdf".into(),
            size: 42,
            encrypted,
            chunks: vec![ChunkRef::generate(), ChunkRef::generate()],
        })
    }

    #[test]
    fn file_manifest_wire_shape() {
        let m = file_manifest(false);
        let json: serde_json::Value =
            serde_json::from_slice(&m.encode(&cipher()).unwrap()).unwrap();
        assert_eq!(json["upload_type"], "file");
        assert_eq!(json["original_filename"], "report.pdf");
        assert_eq!(json["size"], 42);
        assert_eq!(json["encrypted"], false);
        assert_eq!(json["chunks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn legacy_file_manifest_without_upload_type() {
        let raw = br#"{"original_filename":"a.txt","size":3,"encrypted":false,"chunks":["x.part"]}"#;
        let m = Manifest::decode(raw, &cipher()).unwrap();
        assert_eq!(m.logical_name(), "a.txt");
        assert_eq!(m.all_chunks(), vec![ChunkRef::from_raw("x.part")]);
    }

    #[test]
    fn secure_manifest_is_ciphertext() {
        let c = cipher();
        let m = file_manifest(true);
        let bytes = m.encode(&c).unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());
        assert_eq!(Manifest::decode(&bytes, &c).unwrap(), m);
    }

    #[test]
    fn plaintext_decodes_under_any_key() {
        let m = file_manifest(false);
        let bytes = m.encode(&cipher()).unwrap();
        assert_eq!(Manifest::decode(&bytes, &cipher()).unwrap(), m);
    }

    #[test]
    fn ciphertext_under_other_key_is_corrupt() {
        let bytes = file_manifest(true).encode(&cipher()).unwrap();
        assert!(matches!(
            Manifest::decode(&bytes, &cipher()),
            Err(StoreError::CorruptManifest(_))
        ));
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            Manifest::decode(b"not json at all", &cipher()),
            Err(StoreError::CorruptManifest(_))
        ));
        assert!(matches!(
            Manifest::decode(br#"{"upload_type":"folder","encrypted":false}"#, &cipher()),
            Err(StoreError::CorruptManifest(_))
        ));
    }

    #[test]
    fn folder_tree_construction() {
        let mut folder = FolderManifest::new("proj", false);
        let a = ChunkRef::generate();
        let b = ChunkRef::generate();
        folder.insert_file("a.txt", vec![a.clone()], 1).unwrap();
        folder.insert_file("sub/b.txt", vec![b.clone()], 2).unwrap();

        let json = serde_json::to_value(&folder.tree).unwrap();
        assert_eq!(json["a.txt"]["type"], "file");
        assert_eq!(json["sub"]["type"], "directory");
        assert_eq!(json["sub"]["children"]["b.txt"]["type"], "file");

        let paths: Vec<String> = folder.files().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.txt"]);

        let manifest = Manifest::Folder(folder);
        assert_eq!(manifest.all_chunks(), vec![a, b]);
    }

    #[test]
    fn folder_tree_rejects_collisions_and_traversal() {
        let mut folder = FolderManifest::new("proj", false);
        folder.insert_file("a", vec![], 0).unwrap();
        assert!(folder.insert_file("a", vec![], 0).is_err());
        assert!(folder.insert_file("a/b", vec![], 0).is_err());
        assert!(folder.insert_file("../escape", vec![], 0).is_err());
        assert!(folder.insert_file("x//y", vec![], 0).is_err());
    }

    #[test]
    fn node_navigation() {
        let mut folder = FolderManifest::new("proj", false);
        folder.insert_file("sub/deep/c.txt", vec![], 5).unwrap();
        assert!(matches!(
            folder.node_at(&["sub", "deep", "c.txt"]),
            Some(TreeNode::File { size: Some(5), .. })
        ));
        assert!(matches!(
            folder.node_at(&["sub"]),
            Some(TreeNode::Directory { .. })
        ));
        assert!(folder.node_at(&["sub", "nope"]).is_none());
        assert!(folder.node_at(&["sub", "deep", "c.txt", "x"]).is_none());
        assert!(folder.node_at(&[]).is_none());
    }

    #[test]
    fn folder_nodes_without_size_still_decode() {
        let raw = br#"{"upload_type":"folder","folder_name":"p","encrypted":false,
            "tree":{"a":{"type":"file","chunks":["1.part"]},"d":{"type":"directory","children":{}}}}"#;
        let m = Manifest::decode(raw, &cipher()).unwrap();
        let Manifest::Folder(folder) = m else {
            panic!("expected folder manifest");
        };
        assert_eq!(folder.files()[0].size, None);
        assert_eq!(folder.empty_dirs(), vec!["d"]);
    }

    #[test]
    fn matches_ignores_trailing_slash() {
        let m = Manifest::Folder(FolderManifest::new("proj", false));
        assert!(m.matches("proj/"));
        assert!(!m.matches("proj2"));
    }
}
