//! Snapshot domain model

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::Tree;

/// Immutable file tree of one repository at one commit.
///
/// Shared behind an `Arc`; a refresh builds a new snapshot and swaps the
/// reference, it never mutates one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub repo_id: String,
    pub commit: String,
    pub tree: Tree,
    #[serde(with = "time::serde::timestamp")]
    pub materialized_at: OffsetDateTime,
}

impl Snapshot {
    pub fn new(repo_id: impl Into<String>, commit: impl Into<String>, tree: Tree) -> Self {
        Self {
            repo_id: repo_id.into(),
            commit: commit.into(),
            tree,
            materialized_at: OffsetDateTime::now_utc(),
        }
    }
}
