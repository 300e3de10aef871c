use crate::repository::Repository;
use ano_config::Config;
use ano_core::{AnonError, Result};
use ano_storage::{ContentCache, FileIndex};
use dashmap::DashMap;
use std::sync::Arc;

/// Repositories declared in the configuration, built on first use and
/// shared by every request afterwards.
pub struct RepositoryRegistry {
    config: Arc<Config>,
    index: FileIndex,
    cache: ContentCache,
    repositories: DashMap<String, Arc<Repository>>,
}

impl RepositoryRegistry {
    pub fn new(config: Config, index: FileIndex, cache: ContentCache) -> Self {
        Self {
            config: Arc::new(config),
            index,
            cache,
            repositories: DashMap::new(),
        }
    }

    /// Open the index and the cache at the configured locations.
    pub async fn open(config: Config) -> Result<Self> {
        let index = FileIndex::open(&config.database_path).await?;
        let cache = ContentCache::new(config.folder.clone(), config.chunk_size)?;
        Ok(Self::new(config, index, cache))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    /// Declared repository ids, sorted
    pub fn ids(&self) -> Vec<String> {
        self.config.repositories.keys().cloned().collect()
    }

    pub fn get(&self, repo_id: &str) -> Result<Arc<Repository>> {
        if let Some(repository) = self.repositories.get(repo_id) {
            return Ok(Arc::clone(repository.value()));
        }
        let declared = self
            .config
            .repository(repo_id)
            .ok_or_else(|| AnonError::RepoNotFound(repo_id.to_string()))?;
        let repository = Repository::from_config(
            repo_id,
            declared,
            &self.config,
            self.index.clone(),
            self.cache.clone(),
        )?;
        let entry = self
            .repositories
            .entry(repo_id.to_string())
            .or_insert_with(|| Arc::new(repository));
        Ok(Arc::clone(entry.value()))
    }

    pub async fn close(&self) {
        self.index.close().await;
    }
}
