//! Mapping from library errors to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{EtiquetaError, TransferFailure};

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError(pub EtiquetaError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EtiquetaError::UnknownModel(_) => StatusCode::NOT_FOUND,
            EtiquetaError::Transfer(TransferFailure::Busy(_)) => StatusCode::CONFLICT,
            EtiquetaError::Transfer(_) => StatusCode::BAD_GATEWAY,
            EtiquetaError::Asset(_) | EtiquetaError::Image(_) | EtiquetaError::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            EtiquetaError::Encoding(_) | EtiquetaError::Server(_) | EtiquetaError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl<E: Into<EtiquetaError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (
            status,
            Json(json!({ "success": false, "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |e: EtiquetaError| ApiError(e).status();
        assert_eq!(status(EtiquetaError::UnknownModel(1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(TransferFailure::Busy("a".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(status(TransferFailure::LinkLost.into()), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(EtiquetaError::Asset("x".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
