//! Storage layer for ano
//!
//! This crate provides:
//! - The SQLite file index (flat records and serialized trees)
//! - The on-disk content cache

pub mod cache;
pub mod error;
pub mod index;

pub use cache::{CacheEntry, ContentCache};
pub use error::{Result, StorageError};
pub use index::FileIndex;
