//! Resolution, delivery and export over an archive-backed repository

use ano_config::{Config, RepositoryConfig};
use ano_engine::{AnonymizedFile, FilesOptions, RepositoryRegistry};
use ano_redact::{TransformState, redact_path};
use ano_storage::{ContentCache, FileIndex};
use bytes::Bytes;
use futures_util::TryStreamExt;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRsecretorg\0\0\xff\xfe";

const FILES: &[(&str, &[u8])] = &[
    ("src/secretorg/util.py", b"import secretorg\nprint('hi')\n"),
    ("Secret-Org.txt", b"first"),
    ("SECRETORG.txt", b"second"),
    (
        "docs/readme.md",
        b"Maintained by secretorg. Docs at https://example.com/guide\n",
    ),
    ("logo.png", PNG),
    ("notes/plain.txt", b"nothing to hide\n"),
    ("paper.pdf", b"%PDF-1.4 secretorg"),
];

async fn setup(extra_options: &str, max_file_size: u64) -> (TempDir, RepositoryRegistry) {
    let dir = tempfile::tempdir().unwrap();
    let cache = ContentCache::new(dir.path().join("cache"), 4096).unwrap();
    for (path, data) in FILES {
        cache
            .write_bytes("r1", path, Bytes::from_static(*data))
            .await
            .unwrap();
    }

    let repo: RepositoryConfig = toml::from_str(&format!(
        "source = \"archive\"\nterms = [\"secret-?org\"]\n{}",
        extra_options
    ))
    .unwrap();
    let mut config = Config {
        max_file_size,
        ..Config::default()
    };
    config.repositories.insert("r1".to_string(), repo);

    let index = FileIndex::in_memory().await.unwrap();
    (dir, RepositoryRegistry::new(config, index, cache))
}

async fn read(file: &AnonymizedFile<'_>) -> (Vec<u8>, Arc<TransformState>) {
    let content = file.content().await.unwrap();
    let state = content.state();
    let chunks: Vec<Bytes> = content.stream.try_collect().await.unwrap();
    (chunks.concat(), state)
}

#[tokio::test]
async fn test_resolve_masked_directory() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let (anonymized, modified) = redact_path("src/secretorg/util.py", repo.terms());
    assert_eq!(anonymized, "src/XXXX-1/util.py");
    assert!(modified);

    let file = repo.file(&anonymized);
    let record = file.original_path().await.unwrap();
    assert_eq!(record.path, "src/secretorg");
    assert_eq!(record.name, "util.py");
    assert!(!file.is_ambiguous());

    let (content, state) = read(&file).await;
    assert_eq!(content, b"import XXXX-1\nprint('hi')\n");
    assert!(state.was_modified());
}

#[tokio::test]
async fn test_ambiguous_names_resolve_deterministically() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let file = repo.file("XXXX-1.txt");
    let first = file.original_path().await.unwrap().clone();
    assert_eq!(first.name, "SECRETORG.txt");
    assert_eq!(file.candidates(), 2);
    assert!(file.is_ambiguous());

    // Cached on the handle
    assert_eq!(file.original_path().await.unwrap(), &first);

    let again = repo.file("XXXX-1.txt");
    assert_eq!(again.original_path().await.unwrap(), &first);
    assert_eq!(read(&again).await.0, b"second");
}

#[tokio::test]
async fn test_every_unambiguous_record_round_trips() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();
    let snapshot = repo.snapshot().await.unwrap();

    let records = snapshot.tree.to_records("r1");
    let mut collisions: HashMap<String, usize> = HashMap::new();
    for record in &records {
        *collisions
            .entry(redact_path(&record.full_path(), repo.terms()).0)
            .or_default() += 1;
    }

    for record in records.iter().filter(|r| r.is_file()) {
        let anonymized = redact_path(&record.full_path(), repo.terms()).0;
        if collisions[&anonymized] > 1 {
            continue;
        }
        let file = repo.file(&anonymized);
        let resolved = file.original_path().await.unwrap();
        assert_eq!(resolved.full_path(), record.full_path());
        assert_eq!(resolved.size, record.size);
    }
}

#[tokio::test]
async fn test_unmasked_paths() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let file = repo.file("notes/plain.txt");
    assert_eq!(file.original_path().await.unwrap().name, "plain.txt");
    let (content, state) = read(&file).await;
    assert_eq!(content, b"nothing to hide\n");
    assert!(!state.was_modified());

    // The original name of a redacted file is not an address
    let err = repo.file("src/secretorg/util.py").original_path().await.unwrap_err();
    assert_eq!(err.code(), "file_not_found");
}

#[tokio::test]
async fn test_resolution_errors() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let err = repo.file("").original_path().await.unwrap_err();
    assert_eq!(err.code(), "path_not_specified");
    let err = repo.file("/").original_path().await.unwrap_err();
    assert_eq!(err.code(), "path_not_specified");

    let err = repo.file("nope/XXXX-1.txt").original_path().await.unwrap_err();
    assert_eq!(err.code(), "file_not_found");

    let folder = repo.file("src/XXXX-1");
    assert!(!folder.original_path().await.unwrap().is_file());
    let err = folder.content().await.err().unwrap();
    assert_eq!(err.code(), "folder_not_supported");

    assert_eq!(registry.get("unknown").err().unwrap().code(), "repo_not_found");
}

#[tokio::test]
async fn test_binary_passthrough() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let (content, state) = read(&repo.file("logo.png")).await;
    assert_eq!(content, PNG);
    assert_eq!(state.is_text(), Some(false));
    assert!(!state.was_modified());
}

#[tokio::test]
async fn test_file_gates() {
    let (_dir, registry) = setup("image = false\npdf = false", 40).await;
    let repo = registry.get("r1").unwrap();

    let err = repo.file("logo.png").content().await.err().unwrap();
    assert_eq!(err.code(), "file_not_supported");
    let err = repo.file("paper.pdf").content().await.err().unwrap();
    assert_eq!(err.code(), "file_not_supported");
    let err = repo.file("docs/readme.md").content().await.err().unwrap();
    assert_eq!(err.code(), "file_too_big");

    let summary = repo.export_archive(Vec::new()).await.unwrap();
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.files, FILES.len() - 3);
}

#[tokio::test]
async fn test_anonymized_listing() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let tree = repo.anonymized_files(&FilesOptions::default()).await.unwrap();
    let json = serde_json::to_string(&tree).unwrap();
    assert!(!json.to_lowercase().contains("secret"));
    assert!(tree.get("XXXX-1.txt").unwrap().is_file());
    assert!(tree.get("src/XXXX-1/util.py").unwrap().as_file().unwrap().sha.is_none());

    let scoped = repo
        .anonymized_files(&FilesOptions {
            include_sha: true,
            path: Some("src/XXXX-1".to_string()),
        })
        .await
        .unwrap();
    let util = scoped.get("util.py").unwrap().as_file().unwrap();
    assert_eq!(util.sha.as_ref().unwrap().len(), 8);

    let err = repo
        .anonymized_files(&FilesOptions {
            include_sha: false,
            path: Some("missing".to_string()),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "file_not_found");
}

#[tokio::test]
async fn test_refresh_only_when_needed() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let first = repo.refresh(false, None).await.unwrap();
    assert!(first.changed);
    assert_eq!(first.files, FILES.len());

    let second = repo.refresh(false, None).await.unwrap();
    assert!(!second.changed);

    registry
        .cache()
        .write_bytes("r1", "secretorg.md", Bytes::from_static(b"# secretorg"))
        .await
        .unwrap();
    let forced = repo.refresh(true, None).await.unwrap();
    assert!(forced.changed);
    assert_eq!(forced.files, FILES.len() + 1);
    let (content, _) = read(&repo.file("XXXX-1.md")).await;
    assert_eq!(content, b"# XXXX-1");

    // A fresh registry over the same index serves the persisted snapshot
    let reopened = RepositoryRegistry::new(
        registry.config().clone(),
        registry.index().clone(),
        registry.cache().clone(),
    );
    let snapshot = reopened.get("r1").unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.tree.file_count(), FILES.len() + 1);
}

#[tokio::test]
async fn test_export_archive() {
    let (_dir, registry) = setup("", 1024).await;
    let repo = registry.get("r1").unwrap();

    let mut out = Vec::new();
    let summary = repo.export_archive(&mut out).await.unwrap();
    assert_eq!(summary.files, FILES.len());
    assert_eq!(summary.skipped, 0);

    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(&out[..]));
    let mut entries = HashMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.insert(path, data);
    }
    assert!(entries.keys().all(|p| !p.to_lowercase().contains("secret")));
    assert_eq!(entries["src/XXXX-1/util.py"], b"import XXXX-1\nprint('hi')\n");
    assert_eq!(entries["logo.png"], PNG);
}
