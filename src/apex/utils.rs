use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::mail::error::MailError;

#[derive(Debug)]
pub enum VerboseHTTPError {
    Standard(StatusCode, String),
}

impl IntoResponse for VerboseHTTPError {
    fn into_response(self) -> Response {
        match self {
            Self::Standard(status, message) => {
                if status.is_server_error() {
                    tracing::error!("Error Status {}: {}", status, message);
                }
                (status, message).into_response()
            }
        }
    }
}

impl From<MailError> for VerboseHTTPError {
    fn from(error: MailError) -> Self {
        let status = match error {
            MailError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::Standard(status, error.to_string())
    }
}
