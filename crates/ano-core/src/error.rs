use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum AnonError {
    #[error("Path not specified")]
    PathNotSpecified,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Folder not supported: {0}")]
    FolderNotSupported(String),

    #[error("File too big: {path} ({size} bytes, max {max})")]
    FileTooBig { path: String, size: u64, max: u64 },

    #[error("File type not supported: {0}")]
    FileNotSupported(String),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Source unavailable ({context}): {source}")]
    SourceUnavailable {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Storage error: {0}")]
    Storage(BoxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnonError {
    /// Wrap a backend failure with the backend's own context.
    pub fn source_unavailable(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::SourceUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Stable code rendered by clients. Never changes with the message text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathNotSpecified => "path_not_specified",
            Self::FileNotFound(_) => "file_not_found",
            Self::FolderNotSupported(_) => "folder_not_supported",
            Self::FileTooBig { .. } => "file_too_big",
            Self::FileNotSupported(_) => "file_not_supported",
            Self::RepoNotFound(_) => "repo_not_found",
            Self::UnsupportedSource(_) => "unsupported_source",
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::Storage(_) => "storage_error",
            Self::Io(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Whether the error belongs to the expected, user-facing taxonomy
    /// (as opposed to an internal failure that should be logged in full).
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Io(_) | Self::Other(_))
    }
}

pub type Result<T> = std::result::Result<T, AnonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AnonError::PathNotSpecified.code(), "path_not_specified");
        assert_eq!(AnonError::FileNotFound("a".into()).code(), "file_not_found");
        assert_eq!(
            AnonError::FolderNotSupported("a".into()).code(),
            "folder_not_supported"
        );
        assert_eq!(
            AnonError::FileTooBig {
                path: "a".into(),
                size: 2,
                max: 1
            }
            .code(),
            "file_too_big"
        );
        assert_eq!(
            AnonError::FileNotSupported("a.pdf".into()).code(),
            "file_not_supported"
        );
        assert_eq!(
            AnonError::source_unavailable("github", "timeout").code(),
            "source_unavailable"
        );
    }

    #[test]
    fn test_internal_errors_use_fallback_code() {
        let err = AnonError::from(std::io::Error::other("disk"));
        assert_eq!(err.code(), "internal_error");
        assert!(!err.is_expected());

        let err = AnonError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.code(), "internal_error");
    }

    #[test]
    fn test_source_unavailable_keeps_context() {
        let err = AnonError::source_unavailable("GitHubStream blob abc", "HTTP 500");
        let message = err.to_string();
        assert!(message.contains("GitHubStream blob abc"));
        assert!(message.contains("HTTP 500"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
