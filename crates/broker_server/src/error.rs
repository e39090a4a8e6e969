//! Maps broker and adapter failures to protocol responses.
//!
//! This is the only place status codes are chosen for failures. Internal
//! detail is logged, never returned.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use broker_core::BrokerError;
use serde_json::{json, Value};

use crate::middleware::version::ApiVersion;

const ASYNC_REQUIRED: &str =
    "This service plan requires client support for asynchronous service operations.";
const REQUIRES_APP: &str =
    "This service supports generation of credentials through binding an application only.";
const CONCURRENCY_ERROR: &str =
    "The Service Broker does not support concurrent requests that mutate the same resource.";

#[derive(Debug)]
pub enum AppError {
    Broker(BrokerError),
    BadRequest(String),
    Unauthorized,
    PreconditionFailed(ApiVersion),
    UnsupportedMediaType(String),
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        Self::Broker(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                Self::UnsupportedMediaType(rejection.body_text())
            }
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Broker(err) => StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::Broker(err) => broker_body(err),
            Self::BadRequest(msg) | Self::UnsupportedMediaType(msg) => {
                json!({ "description": msg })
            }
            Self::Unauthorized => json!({ "description": "Unauthorized" }),
            Self::PreconditionFailed(minimum) => json!({
                "description": format!("Service broker requires version {minimum}+.")
            }),
        }
    }
}

fn broker_body(err: &BrokerError) -> Value {
    match err {
        BrokerError::AsyncRequired => error_body(err, ASYNC_REQUIRED),
        BrokerError::AppGuidRequired => error_body(err, REQUIRES_APP),
        BrokerError::ConcurrentAccess(_) => error_body(err, CONCURRENCY_ERROR),
        BrokerError::InvalidParameters(msg) => error_body(err, msg),
        BrokerError::InstanceAlreadyExists(_)
        | BrokerError::BindingAlreadyExists { .. }
        | BrokerError::InstanceNotFound(_)
        | BrokerError::BindingNotFound { .. } => json!({}),
        BrokerError::Unauthorized(_) => json!({ "description": "Unauthorized" }),
        BrokerError::Unsupported(_) => json!({ "description": "Not Implemented" }),
        BrokerError::Internal(_) => json!({ "description": "Unexpected error" }),
        BrokerError::PlanNotFound(_)
        | BrokerError::ServiceNotFound(_)
        | BrokerError::Validation(_) => json!({ "description": err.to_string() }),
    }
}

fn error_body(err: &BrokerError, description: &str) -> Value {
    match err.error_code() {
        Some(code) => json!({ "error": code, "description": description }),
        None => json!({ "description": description }),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            Self::Broker(err @ BrokerError::Internal(_)) => {
                tracing::error!(error = ?err, "internal broker failure");
            }
            Self::Broker(err) if err.is_conflict() => {
                tracing::warn!(%err, "conflicting request");
            }
            Self::Broker(err) => tracing::debug!(%err, status = status.as_u16(), "request failed"),
            _ => {}
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(err: BrokerError) -> Value {
        AppError::from(err).body()
    }

    #[test]
    fn status_codes_follow_broker_mapping() {
        assert_eq!(
            AppError::from(BrokerError::AsyncRequired).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(BrokerError::InstanceAlreadyExists("i1".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(BrokerError::Unsupported("get_binding".into())).status_code(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            AppError::PreconditionFailed(ApiVersion::MIN_SUPPORTED).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn unprocessable_bodies_carry_protocol_codes() {
        assert_eq!(
            body(BrokerError::AppGuidRequired),
            json!({ "error": "RequiresApp", "description": REQUIRES_APP })
        );
        assert_eq!(
            body(BrokerError::AsyncRequired),
            json!({ "error": "AsyncRequired", "description": ASYNC_REQUIRED })
        );
        assert_eq!(
            body(BrokerError::ConcurrentAccess("instance i1".into())),
            json!({ "error": "ConcurrencyError", "description": CONCURRENCY_ERROR })
        );
    }

    #[test]
    fn conflicts_and_missing_records_have_empty_bodies() {
        assert_eq!(body(BrokerError::InstanceAlreadyExists("i1".into())), json!({}));
        assert_eq!(body(BrokerError::InstanceNotFound("i1".into())), json!({}));
    }

    #[test]
    fn invalid_parameters_keep_their_message() {
        assert_eq!(
            body(BrokerError::InvalidParameters("size must be positive".into())),
            json!({ "error": "InvalidParameters", "description": "size must be positive" })
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let body = body(BrokerError::Internal(anyhow::anyhow!("password=hunter2")));
        assert_eq!(body, json!({ "description": "Unexpected error" }));
    }

    #[test]
    fn precondition_names_minimum_version() {
        let body = AppError::PreconditionFailed(ApiVersion::new(2, 13)).body();
        assert_eq!(
            body,
            json!({ "description": "Service broker requires version 2.13+." })
        );
    }
}
