use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Json},
};

use super::{delegates::*, schemas::*};
use crate::apex::{state::AppState, utils::VerboseHTTPError};

pub async fn send_endpoint(State(state): State<AppState>, req: Request<Body>) -> impl IntoResponse {
    let query = serde_urlencoded::from_str::<SendQuery>(req.uri().query().unwrap_or(""))
        .unwrap_or_default();

    let body_bytes = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return VerboseHTTPError::Standard(
                StatusCode::BAD_REQUEST,
                "Invalid request body".to_string(),
            )
            .into_response();
        }
    };

    let request: MailSendRequest = match serde_json::from_slice(&body_bytes) {
        Ok(request) => request,
        Err(error) => {
            tracing::debug!("rejecting request body: {}", error);
            return VerboseHTTPError::Standard(
                StatusCode::BAD_REQUEST,
                "Invalid request body".to_string(),
            )
            .into_response();
        }
    };

    tracing::debug!(
        personalizations = request.personalizations.len(),
        dry_run = query.is_dry_run(),
        "mail send request"
    );

    if state.config.validate_addresses {
        if let Err(error) = validate_addresses(&request) {
            return VerboseHTTPError::from(error).into_response();
        }
    }

    if query.is_dry_run() {
        return Json(DryRunResponse {
            data: render_messages(&request),
        })
        .into_response();
    }

    match send_emails(state.dialer.as_ref(), &state.config.smtp, &request).await {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err(error) => VerboseHTTPError::from(error).into_response(),
    }
}
