use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the ingestion handlers
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing imageBase64")]
    MissingImage,

    #[error("invalid data url")]
    InvalidDataUrl,

    #[error("invalid JSON body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("invalid form body: {0}")]
    InvalidForm(#[source] serde_urlencoded::de::Error),

    #[error("{message}")]
    BodyRejected { status: StatusCode, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("no free file name in {} after {attempts} attempts", .dir.display())]
    NamesExhausted { dir: PathBuf, attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body shared by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
}

impl IngestError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingImage
            | IngestError::InvalidDataUrl
            | IngestError::InvalidBody(_)
            | IngestError::InvalidForm(_) => StatusCode::BAD_REQUEST,
            IngestError::BodyRejected { status, .. } => *status,
            IngestError::Serialization(_)
            | IngestError::Io(_)
            | IngestError::Decode(_)
            | IngestError::NamesExhausted { .. }
            | IngestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the error metrics
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::MissingImage => "missing_image",
            IngestError::InvalidDataUrl => "invalid_data_url",
            IngestError::InvalidBody(_) => "invalid_body",
            IngestError::InvalidForm(_) => "invalid_form",
            IngestError::BodyRejected { .. } => "body_rejected",
            IngestError::Serialization(_) => "serialization",
            IngestError::Io(_) => "io",
            IngestError::Decode(_) => "decode",
            IngestError::NamesExhausted { .. } => "names_exhausted",
            IngestError::Internal(_) => "internal",
        }
    }
}

impl From<BytesRejection> for IngestError {
    fn from(rejection: BytesRejection) -> Self {
        IngestError::BodyRejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, reason = self.reason(), "ingestion failed");
        } else {
            tracing::debug!(error = %self, reason = self.reason(), "request rejected");
        }

        if status.is_client_error() {
            metrics::counter!("capture_log_rejected_total", "reason" => self.reason()).increment(1);
        } else {
            metrics::counter!("capture_log_errors_total", "reason" => self.reason()).increment(1);
        }

        (
            status,
            Json(ErrorResponse {
                ok: false,
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_bad_request() {
        assert_eq!(IngestError::MissingImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(IngestError::InvalidDataUrl.status(), StatusCode::BAD_REQUEST);

        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(
            IngestError::InvalidBody(parse_error).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_io_errors_map_to_internal_error() {
        let err = IngestError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("read-only filesystem"));
    }

    #[test]
    fn test_validation_messages_are_stable() {
        assert_eq!(IngestError::MissingImage.to_string(), "missing imageBase64");
        assert_eq!(IngestError::InvalidDataUrl.to_string(), "invalid data url");
    }

    #[test]
    fn test_form_errors_are_client_errors() {
        let form_error = serde_urlencoded::from_str::<Vec<(u32, String)>>("x=1").unwrap_err();
        let err = IngestError::InvalidForm(form_error);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().starts_with("invalid form body"));
    }

    #[test]
    fn test_body_rejection_keeps_status() {
        let err = IngestError::BodyRejected {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".to_string(),
        };
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.to_string(), "length limit exceeded");
    }
}
