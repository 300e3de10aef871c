//! Anonymization engine
//!
//! Ties sources, index and redaction together:
//! - [`Repository`] owns the snapshot served for one repository and
//!   refreshes it when the source moves
//! - [`AnonymizedFile`] resolves an anonymized path back to its original
//!   record and opens the redacted content
//! - [`anonymize_tree`] builds the anonymized listing
//! - [`RepositoryRegistry`] builds repositories from the configuration

pub mod export;
pub mod file;
pub mod registry;
pub mod repository;
pub mod tree_builder;

pub use export::ExportSummary;
pub use file::{AnonymizedFile, FileContent};
pub use registry::RepositoryRegistry;
pub use repository::{FilesOptions, RefreshOutcome, Repository};
pub use tree_builder::{anonymize_tree, short_sha};
