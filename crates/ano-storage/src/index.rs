//! SQLite file index
//!
//! Two tables: `files` holds one row per file or directory of the current
//! snapshot of each repository, `trees` the serialized tree and commit.

use crate::Result;
use ano_core::{FileRecord, Snapshot, Tree};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use time::OffsetDateTime;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS files (
        repo_id TEXT NOT NULL,
        path TEXT NOT NULL,
        name TEXT NOT NULL,
        size INTEGER,
        sha TEXT,
        PRIMARY KEY (repo_id, path, name)
    )",
    "CREATE TABLE IF NOT EXISTS trees (
        repo_id TEXT PRIMARY KEY,
        commit_sha TEXT NOT NULL,
        tree TEXT NOT NULL,
        materialized_at INTEGER NOT NULL
    )",
];

/// Persistent index of repository files
#[derive(Debug, Clone)]
pub struct FileIndex {
    pool: SqlitePool,
}

impl FileIndex {
    /// Open (and create if needed) the index at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .with_regexp();
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    /// Private in-memory index, used by tests and one-shot commands.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.with_regexp();
        // Every connection of an in-memory pool would get its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Replace everything stored for the snapshot's repository in one
    /// transaction.
    pub async fn replace_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let tree_json = serde_json::to_string(&snapshot.tree)?;
        let records = snapshot.tree.to_records(&snapshot.repo_id);

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM files WHERE repo_id = ?")
            .bind(&snapshot.repo_id)
            .execute(&mut *tx)
            .await?;
        for record in &records {
            sqlx::query("INSERT INTO files (repo_id, path, name, size, sha) VALUES (?, ?, ?, ?, ?)")
                .bind(&record.repo_id)
                .bind(&record.path)
                .bind(&record.name)
                .bind(record.size.map(|s| s as i64))
                .bind(record.sha.as_deref())
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(
            "INSERT INTO trees (repo_id, commit_sha, tree, materialized_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(repo_id) DO UPDATE SET
                commit_sha = excluded.commit_sha,
                tree = excluded.tree,
                materialized_at = excluded.materialized_at",
        )
        .bind(&snapshot.repo_id)
        .bind(&snapshot.commit)
        .bind(&tree_json)
        .bind(snapshot.materialized_at.unix_timestamp())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(
            "Indexed {} records for {} at {}",
            records.len(),
            snapshot.repo_id,
            snapshot.commit
        );
        Ok(())
    }

    pub async fn load_snapshot(&self, repo_id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT commit_sha, tree, materialized_at FROM trees WHERE repo_id = ?",
        )
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tree: Tree = serde_json::from_str(&row.try_get::<String, _>("tree")?)?;
        let materialized_at =
            OffsetDateTime::from_unix_timestamp(row.try_get::<i64, _>("materialized_at")?)
                .unwrap_or_else(|_| OffsetDateTime::now_utc());
        Ok(Some(Snapshot {
            repo_id: repo_id.to_string(),
            commit: row.try_get("commit_sha")?,
            tree,
            materialized_at,
        }))
    }

    /// Records whose directory and leaf name match the given patterns.
    ///
    /// Patterns use the regex syntax of the `regex` crate and should be
    /// anchored by the caller.
    pub async fn find_file_records(
        &self,
        repo_id: &str,
        path_pattern: &str,
        name_pattern: &str,
    ) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT repo_id, path, name, size, sha FROM files
             WHERE repo_id = ? AND path REGEXP ? AND name REGEXP ?
             ORDER BY path, name",
        )
        .bind(repo_id)
        .bind(path_pattern)
        .bind(name_pattern)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Exact lookup of one record
    pub async fn find_file_record(
        &self,
        repo_id: &str,
        path: &str,
        name: &str,
    ) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT repo_id, path, name, size, sha FROM files
             WHERE repo_id = ? AND path = ? AND name = ?",
        )
        .bind(repo_id)
        .bind(path)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn count_files(&self, repo_id: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE repo_id = ? AND size IS NOT NULL")
                .bind(repo_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    /// Drop everything stored for a repository.
    pub async fn remove_repository(&self, repo_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM files WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM trees WHERE repo_id = ?")
            .bind(repo_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &SqliteRow) -> Result<FileRecord> {
    Ok(FileRecord {
        repo_id: row.try_get("repo_id")?,
        path: row.try_get("path")?,
        name: row.try_get("name")?,
        size: row.try_get::<Option<i64>, _>("size")?.map(|s| s as u64),
        sha: row.try_get("sha")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ano_core::FileEntry;

    fn snapshot(commit: &str) -> Snapshot {
        let mut tree = Tree::new();
        tree.insert_file(
            "src/secretorg/util.py",
            FileEntry {
                size: 12,
                sha: Some("aaa".to_string()),
            },
        );
        tree.insert_file(
            "src/other/util.py",
            FileEntry {
                size: 7,
                sha: None,
            },
        );
        tree.insert_file(
            "README.md",
            FileEntry {
                size: 3,
                sha: Some("bbb".to_string()),
            },
        );
        tree.insert_dir("docs");
        Snapshot::new("repo1", commit, tree)
    }

    #[tokio::test]
    async fn test_replace_and_load_snapshot() {
        let index = FileIndex::in_memory().await.unwrap();
        assert!(index.load_snapshot("repo1").await.unwrap().is_none());

        let first = snapshot("c1");
        index.replace_snapshot(&first).await.unwrap();
        let loaded = index.load_snapshot("repo1").await.unwrap().unwrap();
        assert_eq!(loaded.commit, "c1");
        assert_eq!(loaded.tree, first.tree);
        assert_eq!(index.count_files("repo1").await.unwrap(), 3);

        let mut second = snapshot("c2");
        second.tree = Tree::new();
        second.tree.insert_file(
            "only.txt",
            FileEntry {
                size: 1,
                sha: None,
            },
        );
        index.replace_snapshot(&second).await.unwrap();
        assert_eq!(index.count_files("repo1").await.unwrap(), 1);
        assert_eq!(
            index.load_snapshot("repo1").await.unwrap().unwrap().commit,
            "c2"
        );
    }

    #[tokio::test]
    async fn test_find_file_records_by_pattern() {
        let index = FileIndex::in_memory().await.unwrap();
        index.replace_snapshot(&snapshot("c1")).await.unwrap();

        let found = index
            .find_file_records("repo1", r"^src/[^/]+$", r"^util\.py$")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].path, "src/other");
        assert_eq!(found[1].path, "src/secretorg");
        assert_eq!(found[1].sha.as_deref(), Some("aaa"));

        let none = index
            .find_file_records("other-repo", r"^src/[^/]+$", r"^util\.py$")
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_file_record_exact() {
        let index = FileIndex::in_memory().await.unwrap();
        index.replace_snapshot(&snapshot("c1")).await.unwrap();

        let readme = index.find_file_record("repo1", "", "README.md").await.unwrap().unwrap();
        assert_eq!(readme.size, Some(3));

        let docs = index.find_file_record("repo1", "", "docs").await.unwrap().unwrap();
        assert!(!docs.is_file());

        assert!(index.find_file_record("repo1", "", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_on_disk_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("index.db");
        let index = FileIndex::open(&path).await.unwrap();
        index.replace_snapshot(&snapshot("c1")).await.unwrap();
        assert!(path.exists());

        index.remove_repository("repo1").await.unwrap();
        assert!(index.load_snapshot("repo1").await.unwrap().is_none());
        assert_eq!(index.count_files("repo1").await.unwrap(), 0);
        index.close().await;
    }
}
