//! HTTP delivery of anonymized repositories

pub mod error;
pub mod server;

pub use error::ApiError;
pub use server::{AMBIGUOUS_HEADER, AnonServer, router};
