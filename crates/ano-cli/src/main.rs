mod cli;
mod commands;

use anyhow::Result;
use ano_config::Config;
use ano_engine::RepositoryRegistry;
use clap::Parser;
use cli::Commands;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_from(std::env::vars());
            config.validate()?;
            config
        }
        None => Config::load()?,
    };

    // Needs neither the index nor the cache
    if let Commands::RedactPath { path, terms, mask } = &cli.command {
        let mask = mask.as_deref().unwrap_or(&config.anonymization_mask);
        commands::redact::handle(path, terms, mask);
        return Ok(());
    }

    let registry = RepositoryRegistry::open(config).await?;
    let result = match cli.command {
        Commands::Serve { host, port } => return commands::serve::handle(registry, host, port).await,
        Commands::Files {
            repo,
            path,
            include_sha,
        } => commands::repo::files(&registry, &repo, path, include_sha).await,
        Commands::Resolve { repo, path } => commands::repo::resolve(&registry, &repo, &path).await,
        Commands::Cat { repo, path } => commands::repo::cat(&registry, &repo, &path).await,
        Commands::Refresh { repo, force } => commands::repo::refresh(&registry, &repo, force).await,
        Commands::Export { repo, output } => commands::repo::export(&registry, &repo, &output).await,
        Commands::Import {
            repo,
            source,
            keep_root,
        } => commands::import::handle(&registry, &repo, &source, keep_root).await,
        Commands::RedactPath { .. } => Ok(()),
    };
    registry.close().await;
    result
}
