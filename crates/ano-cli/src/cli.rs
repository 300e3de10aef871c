use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ano")]
#[command(about = "Serve anonymized repositories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the anonymized file tree
    Files {
        /// Repository id
        repo: String,

        /// Anonymized sub-path to list
        #[arg(long)]
        path: Option<String>,

        /// Include short content identifiers
        #[arg(long)]
        include_sha: bool,
    },

    /// Show the original file behind an anonymized path
    Resolve {
        /// Repository id
        repo: String,

        /// Anonymized path
        path: String,
    },

    /// Print the anonymized content of a file
    Cat {
        /// Repository id
        repo: String,

        /// Anonymized path
        path: String,
    },

    /// Rebuild the snapshot of a repository if its source moved
    Refresh {
        /// Repository id
        repo: String,

        /// Rebuild even when the commit did not change
        #[arg(long)]
        force: bool,
    },

    /// Write the anonymized repository as a .tar.gz
    Export {
        /// Repository id
        repo: String,

        /// Output file
        output: PathBuf,
    },

    /// Load an archive or a directory as the content of an archive repository
    Import {
        /// Repository id
        repo: String,

        /// A .tar.gz/.tgz file or a directory
        source: PathBuf,

        /// Keep the top-level directory of the archive
        #[arg(long)]
        keep_root: bool,
    },

    /// Redact a path with the given terms
    RedactPath {
        path: String,

        /// Term to redact (repeatable, order sets the mask suffix)
        #[arg(long = "term", required = true)]
        terms: Vec<String>,

        /// Mask token (default from config)
        #[arg(long)]
        mask: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_redact_path_terms_keep_order() {
        let cli = Cli::parse_from([
            "ano",
            "redact-path",
            "src/acme/a.py",
            "--term",
            "acme",
            "--term",
            "jane",
        ]);
        match cli.command {
            Commands::RedactPath { path, terms, mask } => {
                assert_eq!(path, "src/acme/a.py");
                assert_eq!(terms, vec!["acme".to_string(), "jane".to_string()]);
                assert!(mask.is_none());
            }
            _ => panic!("expected redact-path"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["ano", "files", "r1", "--config", "/tmp/ano.toml", "--include-sha"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ano.toml")));
        assert!(matches!(cli.command, Commands::Files { include_sha: true, .. }));
    }
}
