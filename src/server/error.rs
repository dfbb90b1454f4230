//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::StreamforgeError;

/// Error returned by the HTTP handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Status code of the response
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Client-facing message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<StreamforgeError>() {
            Some(StreamforgeError::NotFound(what)) => Self {
                status: StatusCode::NOT_FOUND,
                message: format!("Not found: {}", what),
            },
            Some(e @ StreamforgeError::InvalidPage { .. }) => Self {
                status: StatusCode::BAD_REQUEST,
                message: e.to_string(),
            },
            _ => {
                tracing::error!("Request failed: {:#}", err);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Error accessing session data.".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = Json(serde_json::json!({
            "error": self.message,
        }))
        .into_response();
        *response.status_mut() = self.status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: ApiError = anyhow::Error::from(StreamforgeError::NotFound("session s1".into())).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_page_maps_to_400_with_bounds() {
        let err: ApiError =
            anyhow::Error::from(StreamforgeError::InvalidPage { page: 9, max: 2 }).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.message(),
            "Invalid page number 9. Page must be between 1 and 2."
        );
    }

    #[test]
    fn test_storage_error_is_opaque_500() {
        let err: ApiError =
            anyhow::Error::from(StreamforgeError::Storage("disk on fire".into())).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("disk"));
    }
}
