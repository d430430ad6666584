use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::directory::{ApplicationDirectory, DirectoryError};
use super::domain::ConsentRequestId;
use super::notify::{ConsentMailer, EmailTransport, NotifyError, SendConfirmationEmailRequest,
    SendConsentEmailRequest};
use super::resolver::{ConsentResolver, ResolverError, StoreFeedbackRequest};
use super::token::{TokenError, TokenVerification};

/// Shared state behind the consent routes.
pub struct ConsentState<D, T> {
    pub resolver: ConsentResolver<D, T>,
    pub mailer: Arc<ConsentMailer<T>>,
}

/// Router builder exposing the consent resolution engine over HTTP.
pub fn consent_router<D, T>(state: Arc<ConsentState<D, T>>) -> Router
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    Router::new()
        .route("/consents", post(send_consent_email_handler::<D, T>))
        .route("/consents/verify", get(verify_token_handler::<D, T>))
        .route("/consents/feedback", post(store_feedback_handler::<D, T>))
        .route(
            "/consents/:consent_request_id",
            get(summary_handler::<D, T>).post(register_consent_handler::<D, T>),
        )
        .route(
            "/consents/:consent_request_id/confirmation",
            post(send_confirmation_handler::<D, T>),
        )
        .route(
            "/consents/:consent_request_id/installer-rejections",
            post(reject_installers_handler::<D, T>),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyQuery {
    #[serde(default)]
    token: String,
}

/// JSON view of a token verification outcome.
#[derive(Debug, Serialize)]
struct TokenVerificationView {
    token_accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    consent_request_id: Option<ConsentRequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_expiry_date: Option<DateTime<Utc>>,
}

impl From<TokenVerification> for TokenVerificationView {
    fn from(verification: TokenVerification) -> Self {
        match verification {
            TokenVerification::Accepted {
                consent_request_id,
                expiry,
            } => Self {
                token_accepted: true,
                consent_request_id: Some(consent_request_id),
                token_expiry_date: Some(expiry),
            },
            TokenVerification::Rejected => Self {
                token_accepted: false,
                consent_request_id: None,
                token_expiry_date: None,
            },
        }
    }
}

pub(crate) async fn send_consent_email_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    axum::Json(request): axum::Json<SendConsentEmailRequest>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    match state.mailer.send_consent_email(&request).await {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(NotifyError::Invalid(error)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(&other),
    }
}

pub(crate) async fn verify_token_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    Query(query): Query<VerifyQuery>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    match state.mailer.verify_token(&query.token) {
        Ok(verification) => {
            let view = TokenVerificationView::from(verification);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(TokenError::EmptyToken) => {
            let payload = json!({ "error": "token must not be empty" });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error(&other),
    }
}

pub(crate) async fn summary_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    Path(consent_request_id): Path<Uuid>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    let id = ConsentRequestId(consent_request_id);
    match state.resolver.consent_request_summary(id).await {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => resolver_error_response(error),
    }
}

pub(crate) async fn register_consent_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    Path(consent_request_id): Path<Uuid>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    let id = ConsentRequestId(consent_request_id);
    match state.resolver.register_consent(id).await {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => resolver_error_response(error),
    }
}

pub(crate) async fn send_confirmation_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    Path(consent_request_id): Path<Uuid>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    let id = ConsentRequestId(consent_request_id);
    let summary = match state.resolver.consent_request_summary(id).await {
        Ok(summary) => summary,
        Err(error) => return resolver_error_response(error),
    };

    let request = SendConfirmationEmailRequest {
        consent_request_id: id,
        owner_email_address: summary.owner_email,
        installer_email_address: summary.installer_email,
        application_reference_number: summary.application_reference_number,
        installer_name: summary.installer_name,
        technology_type: summary.technology_type,
        address: summary.address,
    };

    let result = state.mailer.send_confirmation_emails(&request).await;
    (StatusCode::OK, axum::Json(result)).into_response()
}

pub(crate) async fn reject_installers_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    Path(consent_request_id): Path<Uuid>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    let id = ConsentRequestId(consent_request_id);
    match state.resolver.reject_competing_installers(id).await {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => resolver_error_response(error),
    }
}

pub(crate) async fn store_feedback_handler<D, T>(
    State(state): State<Arc<ConsentState<D, T>>>,
    axum::Json(request): axum::Json<StoreFeedbackRequest>,
) -> Response
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    let is_success = state.resolver.store_feedback(&request).await;
    (StatusCode::OK, axum::Json(json!({ "is_success": is_success }))).into_response()
}

fn resolver_error_response(error: ResolverError) -> Response {
    match &error {
        ResolverError::Directory(DirectoryError::NotFound(detail)) => {
            let payload = json!({ "error": detail });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        ResolverError::Eligibility(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        _ => internal_error(&error),
    }
}

fn internal_error(error: &dyn std::error::Error) -> Response {
    let payload = json!({ "error": error.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
