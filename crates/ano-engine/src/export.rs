//! Anonymized repository archive

use crate::repository::Repository;
use ano_core::{AnonError, Result};
use ano_redact::redact_path;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use futures_util::TryStreamExt;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub files: usize,
    /// Files left out: too big or of a type the options refuse
    pub skipped: usize,
    pub bytes: u64,
}

impl Repository {
    /// Write every file of the current snapshot as a `.tar.gz`, under its
    /// anonymized path and with its content redacted.
    #[tracing::instrument(skip(self, writer), fields(repo_id = %self.id()))]
    pub async fn export_archive<W: Write + Send>(&self, writer: W) -> Result<ExportSummary> {
        let snapshot = self.snapshot().await?;
        let mtime = snapshot.materialized_at.unix_timestamp().max(0) as u64;
        let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
        let mut summary = ExportSummary::default();

        for record in snapshot.tree.to_records(self.id()) {
            if !record.is_file() {
                continue;
            }
            let (path, _) = redact_path(&record.full_path(), self.terms());
            let content = match self.open(&snapshot.commit, &record, &path).await {
                Ok(content) => content,
                Err(e @ (AnonError::FileTooBig { .. } | AnonError::FileNotSupported(_))) => {
                    tracing::debug!("Skipping {}: {}", path, e);
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let chunks: Vec<Bytes> = content.stream.try_collect().await?;
            let data = chunks.concat();

            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(mtime);
            header.set_cksum();
            builder.append_data(&mut header, &path, data.as_slice())?;

            summary.files += 1;
            summary.bytes += data.len() as u64;
        }

        builder.into_inner()?.finish()?;
        tracing::info!("Exported {} files ({} skipped)", summary.files, summary.skipped);
        Ok(summary)
    }
}
