use super::print_progress;
use anyhow::{Context, Result};
use ano_engine::{FilesOptions, RepositoryRegistry};
use futures_util::TryStreamExt;
use std::io::BufWriter;
use std::path::Path;
use tokio::io::AsyncWriteExt;

pub async fn files(
    registry: &RepositoryRegistry,
    repo: &str,
    path: Option<String>,
    include_sha: bool,
) -> Result<()> {
    let repository = registry.get(repo)?;
    let tree = repository
        .anonymized_files(&FilesOptions { include_sha, path })
        .await?;
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

pub async fn resolve(registry: &RepositoryRegistry, repo: &str, path: &str) -> Result<()> {
    let repository = registry.get(repo)?;
    let file = repository.file(path);
    let record = file.original_path().await?;
    println!("{}", serde_json::to_string_pretty(record)?);
    if file.is_ambiguous() {
        eprintln!(
            "warning: {} original files redact to {}",
            file.candidates(),
            file.anonymized_path()
        );
    }
    Ok(())
}

pub async fn cat(registry: &RepositoryRegistry, repo: &str, path: &str) -> Result<()> {
    let repository = registry.get(repo)?;
    let content = repository.file(path).content().await?;
    let mut stream = content.stream;
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.try_next().await? {
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;
    Ok(())
}

pub async fn refresh(registry: &RepositoryRegistry, repo: &str, force: bool) -> Result<()> {
    let repository = registry.get(repo)?;
    let outcome = repository.refresh(force, Some(&print_progress)).await?;
    if outcome.changed {
        println!("{}: {} files at {}", repo, outcome.files, outcome.commit);
    } else {
        println!("{}: up to date at {}", repo, outcome.commit);
    }
    Ok(())
}

pub async fn export(registry: &RepositoryRegistry, repo: &str, output: &Path) -> Result<()> {
    let repository = registry.get(repo)?;
    let file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let summary = repository.export_archive(BufWriter::new(file)).await?;
    println!(
        "Wrote {} files ({} bytes) to {}",
        summary.files,
        summary.bytes,
        output.display()
    );
    if summary.skipped > 0 {
        println!("Skipped {} files (too big or not supported)", summary.skipped);
    }
    Ok(())
}
