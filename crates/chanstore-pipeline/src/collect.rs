//! Gather a local directory into folder-upload entries.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

use crate::upload::FolderEntry;

/// Read every file under `root` into [`FolderEntry`]s with `/`-separated
/// paths relative to `root`, sorted by path.
///
/// Names matching any glob in `exclude_patterns` are skipped, directories
/// included. Symlinks are not followed.
pub fn collect_folder(root: &Path, exclude_patterns: &[String]) -> Result<Vec<FolderEntry>> {
    let excludes: Vec<glob::Pattern> = exclude_patterns
        .iter()
        .filter_map(|p| glob::Pattern::new(p).ok())
        .collect();

    let mut entries = Vec::new();
    collect_inner(root, "", &excludes, &mut entries)?;
    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path)); // deterministic order
    debug!(root = %root.display(), files = entries.len(), "folder collected");
    Ok(entries)
}

fn collect_inner(
    dir: &Path,
    prefix: &str,
    excludes: &[glob::Pattern],
    out: &mut Vec<FolderEntry>,
) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading dir: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("reading dir entry")?;
        let path = entry.path();
        let file_type = entry.file_type().context("stat dir entry")?;

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if excludes.iter().any(|p| p.matches(name)) {
            continue;
        }

        let rel = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        if file_type.is_dir() {
            collect_inner(&path, &rel, excludes, out)?;
        } else if file_type.is_file() {
            let data =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            out.push(FolderEntry {
                rel_path: rel,
                data: Bytes::from(data),
            });
        }
    }
    Ok(())
}
