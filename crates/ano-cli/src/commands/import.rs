use anyhow::{Result, bail};
use ano_core::SourceKind;
use ano_engine::RepositoryRegistry;
use std::path::Path;

pub async fn handle(registry: &RepositoryRegistry, repo: &str, source: &Path, keep_root: bool) -> Result<()> {
    let Some(declared) = registry.config().repository(repo) else {
        bail!("Repository '{}' is not declared in the config", repo);
    };
    if declared.source != SourceKind::Archive {
        bail!(
            "Repository '{}' uses {}, only archive repositories can be imported",
            repo,
            declared.source.as_str()
        );
    }

    let cache = registry.cache();
    let files = if source.is_dir() {
        cache.import_dir(repo, source).await?
    } else {
        cache.extract_tar_gz(repo, source, !keep_root).await?
    };
    println!("Imported {} files into {}", files, repo);

    let outcome = registry.get(repo)?.refresh(true, None).await?;
    println!("{}: {} files indexed", repo, outcome.files);
    Ok(())
}
