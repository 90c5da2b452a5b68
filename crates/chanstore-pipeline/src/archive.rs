//! Zip packaging for folder downloads.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Pack every file and directory under `src_dir` into a zip at `dest`.
///
/// Entry names are `/`-separated paths relative to `src_dir`, in sorted
/// order. The archive is written next to `dest` and renamed into place.
/// Returns the number of file entries.
pub fn zip_directory(src_dir: &Path, dest: &Path) -> Result<usize> {
    let mut entries = Vec::new();
    walk(src_dir, src_dir, &mut entries)?;
    entries.sort();

    let mut tmp_name = dest.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".chanstore_tmp");
    let tmp = dest.with_file_name(tmp_name);

    let written = write_zip(src_dir, &entries, &tmp);
    match written {
        Ok(files) => {
            std::fs::rename(&tmp, dest)
                .with_context(|| format!("renaming archive to {}", dest.display()))?;
            Ok(files)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_zip(src_dir: &Path, entries: &[(String, bool)], tmp: &Path) -> Result<usize> {
    let out = File::create(tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut zip = ZipWriter::new(out);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut files = 0;
    for (name, is_dir) in entries {
        if *is_dir {
            zip.add_directory(name.as_str(), options)
                .with_context(|| format!("adding directory to zip: {name}"))?;
            continue;
        }
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("adding file to zip: {name}"))?;
        let path: PathBuf = name.split('/').fold(src_dir.to_path_buf(), |p, s| p.join(s));
        let mut input = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        std::io::copy(&mut input, &mut zip)
            .with_context(|| format!("writing {name} to zip"))?;
        files += 1;
    }

    let mut out = zip.finish().context("finalizing zip archive")?;
    out.flush().context("flushing zip archive")?;
    Ok(files)
}

/// Collect `(relative name, is_dir)` for everything below `dir`.
fn walk(root: &Path, dir: &Path, out: &mut Vec<(String, bool)>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading dir: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.context("reading dir entry")?;
        let path = entry.path();
        let meta = entry.metadata().context("stat dir entry")?;
        let rel = path
            .strip_prefix(root)
            .context("entry outside archive root")?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if meta.is_dir() {
            out.push((format!("{rel}/"), true));
            walk(root, &path, out)?;
        } else if meta.is_file() {
            out.push((rel, false));
        }
    }
    Ok(())
}
