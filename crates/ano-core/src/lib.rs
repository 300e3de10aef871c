//! Core domain models for ano
//!
//! This crate contains:
//! - File tree and flat file index records
//! - Repository options and source kinds
//! - Immutable repository snapshots
//! - The byte stream type flowing between sources, cache and delivery
//! - The error taxonomy shared by every layer

pub mod error;
pub mod options;
pub mod snapshot;
pub mod stream;
pub mod tree;

pub use error::{AnonError, Result};
pub use options::{RepositoryOptions, SourceKind};
pub use snapshot::Snapshot;
pub use stream::ByteStream;
pub use tree::{FileEntry, FileRecord, Tree, TreeNode, join_path, normalize_path, split_path};
