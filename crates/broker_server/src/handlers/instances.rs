//! Service instance endpoints under /v2/service_instances/:instance_id.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    Extension, Json,
};
use broker_core::details::{CallerContext, DeprovisionDetails, ProvisionDetails, UpdateDetails};
use broker_core::outcome::{LastOperationOutcome, ProvisionState, UpdateState};
use broker_core::LifecycleOrchestrator;

use crate::api::{
    AcceptsIncomplete, InstanceResponse, LastOperationQuery, LastOperationResponse,
    ProvisionResponse, RemovalQuery, RemovalResponse,
};
use crate::error::AppError;
use crate::handlers::removal_response;

/// PUT: 201 when created, 200 on an identical replay, 202 when accepted
/// for asynchronous completion.
pub async fn provision(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Extension(caller): Extension<CallerContext>,
    Path(instance_id): Path<String>,
    query: Result<Query<AcceptsIncomplete>, QueryRejection>,
    payload: Result<Json<ProvisionDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<ProvisionResponse>), AppError> {
    let Query(query) = query?;
    let Json(mut details) = payload?;
    details.caller = caller;

    let outcome = broker
        .provision(&instance_id, details, query.accepts_incomplete)
        .await?;
    let status = match outcome.state {
        ProvisionState::Created => StatusCode::CREATED,
        ProvisionState::AlreadyExists => StatusCode::OK,
        ProvisionState::Accepted => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome.into())))
}

/// PATCH: 200 when applied, 202 when accepted.
pub async fn update(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Extension(caller): Extension<CallerContext>,
    Path(instance_id): Path<String>,
    query: Result<Query<AcceptsIncomplete>, QueryRejection>,
    payload: Result<Json<UpdateDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<ProvisionResponse>), AppError> {
    let Query(query) = query?;
    let Json(mut details) = payload?;
    details.caller = caller;

    let outcome = broker
        .update(&instance_id, details, query.accepts_incomplete)
        .await?;
    let status = match outcome.state {
        UpdateState::Updated => StatusCode::OK,
        UpdateState::Accepted => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome.into())))
}

/// DELETE: `service_id` and `plan_id` query parameters are required.
pub async fn deprovision(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Extension(caller): Extension<CallerContext>,
    Path(instance_id): Path<String>,
    query: Result<Query<RemovalQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<RemovalResponse>), AppError> {
    let Query(query) = query?;
    let (service_id, plan_id) = query.ids().ok_or_else(|| {
        AppError::BadRequest("service_id and plan_id are required".into())
    })?;
    let mut details = DeprovisionDetails::new(service_id, plan_id);
    details.caller = caller;

    let outcome = broker
        .deprovision(&instance_id, details, query.accepts_incomplete)
        .await?;
    Ok(removal_response(outcome))
}

pub async fn get_instance(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Path(instance_id): Path<String>,
) -> Result<Json<InstanceResponse>, AppError> {
    let snapshot = broker.get_instance(&instance_id).await?;
    Ok(Json(snapshot.into()))
}

/// GET .../last_operation: 410 once the instance is gone or the operation
/// has already been reported as finished.
pub async fn last_operation(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Path(instance_id): Path<String>,
    query: Result<Query<LastOperationQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<LastOperationResponse>), AppError> {
    let Query(query) = query?;
    let outcome = broker
        .last_operation(&instance_id, query.operation.as_deref())
        .await?;
    Ok(last_operation_response(outcome))
}

pub(crate) fn last_operation_response(
    outcome: LastOperationOutcome,
) -> (StatusCode, Json<LastOperationResponse>) {
    match outcome {
        LastOperationOutcome::Status(status) => (StatusCode::OK, Json(status.into())),
        LastOperationOutcome::Gone | LastOperationOutcome::UnknownOperation => {
            (StatusCode::GONE, Json(LastOperationResponse::gone()))
        }
    }
}
