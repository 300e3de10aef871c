//! Resolution of anonymized paths back to original files

use crate::repository::{Repository, extension};
use ano_core::{AnonError, ByteStream, FileRecord, Result, normalize_path, split_path};
use ano_redact::{AnonymizeStream, TransformState, redact_path};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Matches one masked directory segment
const SEGMENT_WILDCARD: &str = "[^/]+";
/// Matches the masked part of a leaf name
const NAME_WILDCARD: &str = ".+";

#[derive(Debug, Clone)]
struct Resolution {
    record: FileRecord,
    /// Commit of the snapshot the record was found in
    commit: String,
    candidates: usize,
}

/// Per-request handle on a file addressed by its anonymized path.
///
/// The original record is resolved at most once per handle.
pub struct AnonymizedFile<'a> {
    repository: &'a Repository,
    anonymized_path: String,
    resolution: OnceCell<Resolution>,
}

impl<'a> AnonymizedFile<'a> {
    pub fn new(repository: &'a Repository, anonymized_path: impl Into<String>) -> Self {
        Self {
            repository,
            anonymized_path: normalize_path(&anonymized_path.into()),
            resolution: OnceCell::new(),
        }
    }

    pub fn anonymized_path(&self) -> &str {
        &self.anonymized_path
    }

    pub fn extension(&self) -> Option<String> {
        extension(&self.anonymized_path)
    }

    /// Original record behind the anonymized path
    pub async fn original_path(&self) -> Result<&FileRecord> {
        let resolution = self.resolution.get_or_try_init(|| self.resolve()).await?;
        Ok(&resolution.record)
    }

    /// Number of original files that redact to this path. Zero before
    /// resolution.
    pub fn candidates(&self) -> usize {
        self.resolution.get().map_or(0, |r| r.candidates)
    }

    /// Whether resolution had to pick among several originals
    pub fn is_ambiguous(&self) -> bool {
        self.candidates() > 1
    }

    pub fn is_file_supported(&self) -> bool {
        self.repository.is_file_supported(&self.anonymized_path)
    }

    /// Redacted content. Resolution and every gate run before any byte
    /// is read from the source.
    pub async fn content(&self) -> Result<FileContent> {
        let resolution = self.resolution.get_or_try_init(|| self.resolve()).await?;
        self.repository
            .open(&resolution.commit, &resolution.record, &self.anonymized_path)
            .await
    }

    #[tracing::instrument(skip(self), fields(repo_id = %self.repository.id(), path = %self.anonymized_path))]
    async fn resolve(&self) -> Result<Resolution> {
        if self.anonymized_path.is_empty() {
            return Err(AnonError::PathNotSpecified);
        }
        let repo_id = self.repository.id();
        // The index must hold a snapshot before it can be queried
        let snapshot = self.repository.snapshot().await?;

        let (dir, name) = split_path(&self.anonymized_path);
        let mask = self.repository.mask();
        let candidates = if mask.is_present(&self.anonymized_path) {
            let dir_pattern = directory_pattern(&dir, |segment| mask.is_present(segment));
            let name_pattern = mask.wildcard_pattern(&name, NAME_WILDCARD);
            self.repository
                .index()
                .find_file_records(repo_id, &dir_pattern, &name_pattern)
                .await?
        } else {
            self.repository
                .index()
                .find_file_record(repo_id, &dir, &name)
                .await?
                .into_iter()
                .collect()
        };

        let terms = self.repository.terms();
        let mut matches: Vec<FileRecord> = candidates
            .into_iter()
            .filter(|record| redact_path(&record.full_path(), terms).0 == self.anonymized_path)
            .collect();
        matches.sort_by(|a, b| (&a.path, &a.name).cmp(&(&b.path, &b.name)));

        let count = matches.len();
        let record = matches
            .into_iter()
            .next()
            .ok_or_else(|| AnonError::FileNotFound(self.anonymized_path.clone()))?;
        if count > 1 {
            tracing::warn!("{} originals redact to the same path, serving the first", count);
        }
        Ok(Resolution {
            record,
            commit: snapshot.commit.clone(),
            candidates: count,
        })
    }
}

/// Anchored pattern over a directory: masked segments become wildcards,
/// the others stay literal.
fn directory_pattern(dir: &str, is_masked: impl Fn(&str) -> bool) -> String {
    if dir.is_empty() {
        return "^$".to_string();
    }
    let segments: Vec<String> = dir
        .split('/')
        .map(|segment| {
            if is_masked(segment) {
                SEGMENT_WILDCARD.to_string()
            } else {
                regex::escape(segment)
            }
        })
        .collect();
    format!("^{}$", segments.join("/"))
}

/// Redacted content of one file
pub struct FileContent {
    /// Size of the original content
    pub size: u64,
    pub stream: AnonymizeStream<ByteStream>,
}

impl FileContent {
    pub(crate) fn new(size: u64, stream: AnonymizeStream<ByteStream>) -> Self {
        Self { size, stream }
    }

    pub fn state(&self) -> Arc<TransformState> {
        self.stream.state()
    }
}
