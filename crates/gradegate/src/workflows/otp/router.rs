use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{CodeGenerator, OtpError, OtpVerifier};
use crate::workflows::results::repository::NotificationSender;

#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub identity: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub identity: String,
    pub code: String,
}

pub fn otp_router<N, G>(verifier: Arc<OtpVerifier<N, G>>) -> Router
where
    N: NotificationSender + 'static,
    G: CodeGenerator + 'static,
{
    Router::new()
        .route("/api/v1/otp/generate", post(generate_handler::<N, G>))
        .route("/api/v1/otp/verify", post(verify_handler::<N, G>))
        .route("/api/v1/otp/status", post(status_handler::<N, G>))
        .with_state(verifier)
}

pub fn status_for(err: &OtpError) -> StatusCode {
    match err {
        OtpError::NotFound => StatusCode::NOT_FOUND,
        OtpError::AlreadyUsed => StatusCode::CONFLICT,
        OtpError::Expired => StatusCode::GONE,
        OtpError::AttemptsExceeded => StatusCode::TOO_MANY_REQUESTS,
        OtpError::InvalidCode { .. } | OtpError::InvalidIdentity => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        OtpError::Delivery(_) => StatusCode::BAD_GATEWAY,
        OtpError::ExpiryOutOfRange | OtpError::Unavailable => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: OtpError) -> Response {
    let mut payload = json!({
        "error": err.to_string(),
        "code": err.code(),
    });
    if let OtpError::InvalidCode { remaining } = err {
        payload["attempts_remaining"] = json!(remaining);
    }
    (status_for(&err), axum::Json(payload)).into_response()
}

pub(crate) async fn generate_handler<N, G>(
    State(verifier): State<Arc<OtpVerifier<N, G>>>,
    axum::Json(request): axum::Json<IdentityRequest>,
) -> Response
where
    N: NotificationSender + 'static,
    G: CodeGenerator + 'static,
{
    match verifier.generate(&request.identity) {
        Ok(issued) => (StatusCode::ACCEPTED, axum::Json(issued)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verify_handler<N, G>(
    State(verifier): State<Arc<OtpVerifier<N, G>>>,
    axum::Json(request): axum::Json<VerifyRequest>,
) -> Response
where
    N: NotificationSender + 'static,
    G: CodeGenerator + 'static,
{
    match verifier.verify(&request.identity, &request.code) {
        Ok(()) => {
            let payload = json!({ "verified": true });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<N, G>(
    State(verifier): State<Arc<OtpVerifier<N, G>>>,
    axum::Json(request): axum::Json<IdentityRequest>,
) -> Response
where
    N: NotificationSender + 'static,
    G: CodeGenerator + 'static,
{
    match verifier.status(&request.identity) {
        Ok(status) => (StatusCode::OK, axum::Json(status)).into_response(),
        Err(err) => error_response(err),
    }
}
