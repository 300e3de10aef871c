use ano_core::{RepositoryOptions, SourceKind};
use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ============================================================================
// Global Config (config.toml)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Literal substituted for redacted content
    #[serde(default = "default_mask")]
    pub anonymization_mask: String,

    /// Files above this size (bytes) are never streamed
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Extensions always treated as text
    #[serde(default = "default_additional_extensions")]
    pub additional_extensions: Vec<String>,

    /// Host of the anonymized viewer, used for self-link rewriting
    #[serde(default = "default_app_hostname")]
    pub app_hostname: String,

    /// Root of the local content cache
    #[serde(default = "default_folder")]
    pub folder: PathBuf,

    /// SQLite file holding the file index
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub github_token: String,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Maximum number of entries listed per folder when walking a truncated tree
    #[serde(default = "default_max_file_folder")]
    pub max_file_folder: usize,

    /// Read size for local content streams
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Repository declaration (`[repositories.<id>]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub source: SourceKind,

    /// `owner/name` on GitHub; unused for archives
    #[serde(default)]
    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Pinned commit; resolved from the branch head when absent
    #[serde(default)]
    pub commit: Option<String>,

    /// Per-repository token, falls back to the global one
    #[serde(default)]
    pub token: Option<String>,

    #[serde(flatten)]
    pub options: RepositoryOptions,
}

impl RepositoryConfig {
    /// Split `owner/name`.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.repository.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anonymization_mask: default_mask(),
            max_file_size: default_max_file_size(),
            additional_extensions: default_additional_extensions(),
            app_hostname: default_app_hostname(),
            folder: default_folder(),
            database_path: default_database_path(),
            github_token: String::new(),
            github_api_url: default_github_api_url(),
            max_file_folder: default_max_file_folder(),
            chunk_size: default_chunk_size(),
            server: ServerConfig::default(),
            repositories: BTreeMap::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_mask() -> String {
    "XXXX".to_string()
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_additional_extensions() -> Vec<String> {
    ["license", "dockerfile", "sbt", "ipynb", "gp", "out", "sol", "in"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_app_hostname() -> String {
    "anonymous.4open.science".to_string()
}

fn data_dir() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("science", "4open", "ano") {
        dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".ano")
    }
}

fn default_folder() -> PathBuf {
    data_dir().join("repositories")
}

fn default_database_path() -> PathBuf {
    data_dir().join("index.db")
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_max_file_folder() -> usize {
    1000
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_branch() -> String {
    "main".to_string()
}

impl Config {
    /// Load config from default location or create default if not found,
    /// then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_from(std::env::vars());
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file, creating it with defaults when missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            tracing::info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Get config file path
    pub fn config_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("science", "4open", "ano") {
            dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from(".ano/config.toml")
        }
    }

    /// Override settings from environment-style key/value pairs.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "ANONYMIZATION_MASK" if !value.trim().is_empty() => {
                    self.anonymization_mask = value
                }
                "MAX_FILE_SIZE" => set_parsed(&mut self.max_file_size, &key, &value),
                "APP_HOSTNAME" => self.app_hostname = value,
                "FOLDER" => self.folder = PathBuf::from(value),
                "DATABASE_PATH" => self.database_path = PathBuf::from(value),
                "GITHUB_TOKEN" => self.github_token = value,
                "GITHUB_API_URL" => self.github_api_url = value,
                "MAX_FILE_FOLDER" => set_parsed(&mut self.max_file_folder, &key, &value),
                "CHUNK_SIZE" => set_parsed(&mut self.chunk_size, &key, &value),
                "HOST" => self.server.host = value,
                "PORT" => set_parsed(&mut self.server.port, &key, &value),
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.anonymization_mask.trim().is_empty() {
            bail!("anonymization_mask must not be empty");
        }
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        for (id, repo) in &self.repositories {
            if repo.source != SourceKind::Archive && repo.owner_and_name().is_none() {
                bail!(
                    "repository '{}' needs `repository = \"owner/name\"` for {}",
                    id,
                    repo.source.as_str()
                );
            }
        }
        Ok(())
    }

    pub fn repository(&self, repo_id: &str) -> Option<&RepositoryConfig> {
        self.repositories.get(repo_id)
    }

    /// Token for a repository, preferring its own
    pub fn token_for(&self, repo: &RepositoryConfig) -> Option<String> {
        repo.token
            .clone()
            .or_else(|| Some(self.github_token.clone()))
            .filter(|t| !t.is_empty())
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, value: &str) {
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!("Ignoring invalid value for {}: {:?}", key, value),
    }
}
