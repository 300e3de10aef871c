use ano_core::AnonError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error rendered as `{"error": "<code>"}`
#[derive(Debug)]
pub struct ApiError(pub AnonError);

impl From<AnonError> for ApiError {
    fn from(err: AnonError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &AnonError) -> StatusCode {
    match err {
        AnonError::PathNotSpecified | AnonError::FolderNotSupported(_) => StatusCode::BAD_REQUEST,
        AnonError::FileNotFound(_) | AnonError::RepoNotFound(_) => StatusCode::NOT_FOUND,
        AnonError::FileTooBig { .. } | AnonError::FileNotSupported(_) => StatusCode::FORBIDDEN,
        AnonError::SourceUnavailable { .. } => StatusCode::BAD_GATEWAY,
        AnonError::UnsupportedSource(_)
        | AnonError::Storage(_)
        | AnonError::Io(_)
        | AnonError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if self.0.is_expected() && status != StatusCode::BAD_GATEWAY {
            tracing::debug!("{}", self.0);
        } else {
            tracing::error!("{:?}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.code() }))).into_response()
    }
}
