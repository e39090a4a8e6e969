pub mod bindings;
pub mod catalog;
pub mod health;
pub mod instances;

use axum::{http::StatusCode, Json};
use broker_core::outcome::RemovalOutcome;

use crate::api::RemovalResponse;

/// Shared by deprovision and unbind: 200 `{}` when removed, 202 with the
/// operation token when accepted, 410 `{}` when nothing was there.
pub(crate) fn removal_response(outcome: RemovalOutcome) -> (StatusCode, Json<RemovalResponse>) {
    match outcome {
        RemovalOutcome::Removed => (StatusCode::OK, Json(RemovalResponse::default())),
        RemovalOutcome::Accepted(token) => (
            StatusCode::ACCEPTED,
            Json(RemovalResponse {
                operation: Some(token),
            }),
        ),
        RemovalOutcome::Gone => (StatusCode::GONE, Json(RemovalResponse::default())),
    }
}
