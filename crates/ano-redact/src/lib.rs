//! Redaction engine for anonymized repositories
//!
//! This crate provides:
//! - Safe term matchers built from untrusted user input
//! - Content and path redaction
//! - Text/binary classification
//! - A chunked redaction transform and its async stream adapter

pub mod classifier;
pub mod redactor;
pub mod terms;
pub mod transform;

pub use classifier::{Classification, TextClassifier, sniff};
pub use redactor::{AnonymizerOptions, ContentAnonymizer, Redaction, SelfLink, redact_path};
pub use terms::{MaskPattern, TermMatcher, TermSet};
pub use transform::{AnonymizeStream, ChunkTransformer, TransformState};
