//! Integration test: every failure path leaves the disk clean and reports
//! the right error kind.

use bytes::Bytes;
use chanstore_core::{ChannelRef, StoreError};
use chanstore_crypto::{Cipher, CipherKey};
use chanstore_pipeline::{ChannelStore, FolderEntry, Manifest, PipelineConfig};
use chanstore_storage::MemoryBackend;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn channel() -> ChannelRef {
    ChannelRef::new("guild-1", "vault")
}

fn config(data_dir: &Path) -> PipelineConfig {
    PipelineConfig::new(Cipher::new(CipherKey::generate()))
        .with_put_delay(Duration::ZERO)
        .with_delete_delay(Duration::ZERO)
        .with_chunk_limit(8)
        .with_data_dir(data_dir)
}

fn setup(tmp: &TempDir) -> (Arc<MemoryBackend>, PipelineConfig, ChannelStore) {
    let backend = Arc::new(MemoryBackend::new());
    backend.create_channel(&channel());
    let cfg = config(tmp.path());
    let store = ChannelStore::new(backend.clone(), cfg.clone()).unwrap();
    (backend, cfg, store)
}

fn chunk_names(
    backend: &MemoryBackend,
    cfg: &PipelineConfig,
    manifest_object: &str,
) -> Vec<String> {
    let raw = backend.payload(&channel(), manifest_object).unwrap();
    Manifest::decode(&raw, &cfg.cipher)
        .unwrap()
        .all_chunks()
        .iter()
        .map(|r| r.as_str().to_string())
        .collect()
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut d| d.next().is_none())
}

#[tokio::test]
async fn missing_manifest_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let (_, _, store) = setup(&tmp);
    let err = store.download(&channel(), "ghost.txt").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert!(dir_is_empty(tmp.path()));
}

#[tokio::test]
async fn missing_chunk_aborts_without_partial_output() {
    let tmp = TempDir::new().unwrap();
    let (backend, cfg, store) = setup(&tmp);
    store
        .upload_file(&channel(), "doc.txt", Bytes::from_static(b"0123456789abcdefXYZ"), false)
        .await
        .unwrap();

    let chunks = chunk_names(&backend, &cfg, "doc.txt_metadata.json");
    assert_eq!(chunks.len(), 3);
    assert!(backend.remove(&channel(), &chunks[2]));

    let err = store.download(&channel(), "doc.txt").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert!(dir_is_empty(tmp.path()), "no partial file may remain");
}

#[tokio::test]
async fn tampered_chunk_fails_authentication_without_partial_output() {
    let tmp = TempDir::new().unwrap();
    let (backend, cfg, store) = setup(&tmp);
    store
        .upload_file(&channel(), "doc.txt", Bytes::from_static(b"secret payload here"), true)
        .await
        .unwrap();

    let chunks = chunk_names(&backend, &cfg, "doc.txt_metadata.json");
    let mut tampered = backend.payload(&channel(), &chunks[1]).unwrap().to_vec();
    tampered[0] ^= 0xff;
    assert!(backend.replace_payload(&channel(), &chunks[1], Bytes::from(tampered)));

    let err = store.download(&channel(), "doc.txt").await.unwrap_err();
    assert!(matches!(err, StoreError::Authentication(_)), "got {err:?}");
    assert!(dir_is_empty(tmp.path()));
}

#[tokio::test]
async fn foreign_key_cannot_read_secure_uploads() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    backend.create_channel(&channel());

    let writer = ChannelStore::new(backend.clone(), config(tmp.path())).unwrap();
    writer
        .upload_folder(
            &channel(),
            "proj",
            vec![FolderEntry::new("a.txt", Bytes::from_static(b"alpha"))],
            false,
        )
        .await
        .unwrap();
    writer
        .upload_file(&channel(), "locked.txt", Bytes::from_static(b"locked"), true)
        .await
        .unwrap();

    let reader = ChannelStore::new(backend.clone(), config(tmp.path())).unwrap();
    // a secure manifest under a foreign key decodes as neither form
    let err = reader.download(&channel(), "locked.txt").await.unwrap_err();
    assert!(matches!(err, StoreError::CorruptManifest(_)), "got {err:?}");
    // plaintext manifests remain readable by anyone
    assert!(reader.download(&channel(), "proj").await.is_ok());
}

#[tokio::test]
async fn encrypted_chunks_under_a_foreign_key_fail_authentication() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    backend.create_channel(&channel());
    let writer_cfg = config(tmp.path());
    let writer = ChannelStore::new(backend.clone(), writer_cfg.clone()).unwrap();
    writer
        .upload_file(&channel(), "locked.txt", Bytes::from_static(b"locked"), true)
        .await
        .unwrap();

    // re-store the manifest as plaintext JSON so only the chunks stay sealed
    let raw = backend.payload(&channel(), "locked.txt_metadata.json").unwrap();
    let manifest = Manifest::decode(&raw, &writer_cfg.cipher).unwrap();
    assert!(backend.replace_payload(
        &channel(),
        "locked.txt_metadata.json",
        Bytes::from(serde_json::to_vec(&manifest).unwrap())
    ));

    let reader = ChannelStore::new(backend.clone(), config(tmp.path())).unwrap();
    let err = reader.download(&channel(), "locked.txt").await.unwrap_err();
    assert!(matches!(err, StoreError::Authentication(_)), "got {err:?}");
    assert!(dir_is_empty(tmp.path()));
}

#[tokio::test]
async fn garbage_manifest_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let (backend, _, store) = setup(&tmp);
    store
        .upload_file(&channel(), "doc.txt", Bytes::from_static(b"x"), false)
        .await
        .unwrap();
    assert!(backend.replace_payload(
        &channel(),
        "doc.txt_metadata.json",
        Bytes::from_static(b"\x00\x01 definitely not a manifest")
    ));

    let err = store.download(&channel(), "doc.txt").await.unwrap_err();
    assert!(matches!(err, StoreError::CorruptManifest(_)), "got {err:?}");
}

#[tokio::test]
async fn folder_with_a_missing_chunk_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let (backend, cfg, store) = setup(&tmp);
    store
        .upload_folder(
            &channel(),
            "proj",
            vec![
                FolderEntry::new("a.txt", Bytes::from_static(b"alpha")),
                FolderEntry::new("sub/b.txt", Bytes::from_static(b"bravo bravo bravo")),
            ],
            true,
        )
        .await
        .unwrap();

    let chunks = chunk_names(&backend, &cfg, "proj_metadata.json");
    assert!(backend.remove(&channel(), chunks.last().unwrap()));

    let err = store.download(&channel(), "proj").await.unwrap_err();
    assert!(err.is_not_found(), "got {err:?}");
    assert!(dir_is_empty(tmp.path()), "staging and archive must be removed");
}

#[tokio::test]
async fn interrupted_file_upload_reports_orphans() {
    let tmp = TempDir::new().unwrap();
    let (backend, _, store) = setup(&tmp);
    backend.fail_puts_after(2);

    // 20 bytes / 8 = 3 chunks; the third put fails
    let err = store
        .upload_file(&channel(), "doc.txt", Bytes::from(vec![7u8; 20]), false)
        .await
        .unwrap_err();
    match err {
        StoreError::PartialUpload {
            chunks_written,
            manifest_written,
            ..
        } => {
            assert_eq!(chunks_written, 2);
            assert!(!manifest_written);
        }
        other => panic!("expected partial upload, got {other:?}"),
    }

    // orphaned chunks remain, but no manifest points at them
    assert_eq!(backend.len(&channel()), 2);
    assert!(store.download(&channel(), "doc.txt").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn interrupted_folder_upload_reports_manifest_written() {
    let tmp = TempDir::new().unwrap();
    let (backend, _, store) = setup(&tmp);
    backend.fail_puts_after(2);

    let err = store
        .upload_folder(
            &channel(),
            "proj",
            vec![
                FolderEntry::new("a.txt", Bytes::from(vec![1u8; 8])),
                FolderEntry::new("b.txt", Bytes::from(vec![2u8; 8])),
            ],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::PartialUpload {
            chunks_written: 1,
            manifest_written: true,
            ..
        }
    ));
}

#[tokio::test]
async fn first_put_failure_is_not_partial() {
    let tmp = TempDir::new().unwrap();
    let (backend, _, store) = setup(&tmp);
    backend.fail_puts_after(0);
    let err = store
        .upload_file(&channel(), "doc.txt", Bytes::from_static(b"x"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)), "got {err:?}");
}

#[tokio::test]
async fn unknown_channel_is_unavailable() {
    let tmp = TempDir::new().unwrap();
    let (_, _, store) = setup(&tmp);
    let nowhere = ChannelRef::new("guild-1", "no-such-channel");

    let up = store
        .upload_file(&nowhere, "a.txt", Bytes::from_static(b"x"), false)
        .await
        .unwrap_err();
    assert!(matches!(up, StoreError::BackendUnavailable(_)), "got {up:?}");

    let down = store.download(&nowhere, "a.txt").await.unwrap_err();
    assert!(matches!(down, StoreError::BackendUnavailable(_)));

    let del = store.delete(&nowhere, "a.txt").await.unwrap_err();
    assert!(matches!(del, StoreError::BackendUnavailable(_)));
}

#[tokio::test]
async fn oversized_chunks_surface_as_backend_errors() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new().with_max_object_size(4));
    backend.create_channel(&channel());
    let store = ChannelStore::new(backend, config(tmp.path())).unwrap();

    let err = store
        .upload_file(&channel(), "big.txt", Bytes::from(vec![0u8; 8]), false)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)), "got {err:?}");
}

#[tokio::test]
async fn manifests_beyond_the_page_cap_are_invisible() {
    let tmp = TempDir::new().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    backend.create_channel(&channel());
    let store = ChannelStore::new(backend.clone(), config(tmp.path()).with_page_cap(3)).unwrap();

    store
        .upload_file(&channel(), "old.txt", Bytes::from_static(b"old"), false)
        .await
        .unwrap();
    for i in 0..3 {
        store
            .upload_file(&channel(), &format!("new{i}.txt"), Bytes::from_static(b"n"), false)
            .await
            .unwrap();
    }

    let err = store.download(&channel(), "old.txt").await.unwrap_err();
    assert!(err.is_not_found());
}
