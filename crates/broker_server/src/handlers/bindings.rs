//! Service binding endpoints under
//! /v2/service_instances/:instance_id/service_bindings/:binding_id.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query,
    },
    http::StatusCode,
    Extension, Json,
};
use broker_core::details::{BindDetails, CallerContext, UnbindDetails};
use broker_core::outcome::BindState;
use broker_core::LifecycleOrchestrator;

use crate::api::{
    AcceptsIncomplete, BindResponse, BindingResponse, LastOperationQuery, LastOperationResponse,
    RemovalQuery, RemovalResponse,
};
use crate::error::AppError;
use crate::handlers::instances::last_operation_response;
use crate::handlers::removal_response;

pub async fn bind(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Extension(caller): Extension<CallerContext>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    query: Result<Query<AcceptsIncomplete>, QueryRejection>,
    payload: Result<Json<BindDetails>, JsonRejection>,
) -> Result<(StatusCode, Json<BindResponse>), AppError> {
    let Query(query) = query?;
    let Json(mut details) = payload?;
    details.caller = caller;

    let outcome = broker
        .bind(&instance_id, &binding_id, details, query.accepts_incomplete)
        .await?;
    let status = match outcome.state {
        BindState::Created => StatusCode::CREATED,
        BindState::AlreadyExists => StatusCode::OK,
        BindState::Accepted => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome.into())))
}

pub async fn unbind(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Extension(caller): Extension<CallerContext>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    query: Result<Query<RemovalQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<RemovalResponse>), AppError> {
    let Query(query) = query?;
    let (service_id, plan_id) = query.ids().ok_or_else(|| {
        AppError::BadRequest("service_id and plan_id are required".into())
    })?;
    let mut details = UnbindDetails::new(service_id, plan_id);
    details.caller = caller;

    let outcome = broker
        .unbind(&instance_id, &binding_id, details, query.accepts_incomplete)
        .await?;
    Ok(removal_response(outcome))
}

pub async fn get_binding(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Result<Json<BindingResponse>, AppError> {
    let snapshot = broker.get_binding(&instance_id, &binding_id).await?;
    Ok(Json(snapshot.into()))
}

pub async fn last_operation(
    Extension(broker): Extension<Arc<LifecycleOrchestrator>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    query: Result<Query<LastOperationQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<LastOperationResponse>), AppError> {
    let Query(query) = query?;
    let outcome = broker
        .last_binding_operation(&instance_id, &binding_id, query.operation.as_deref())
        .await?;
    Ok(last_operation_response(outcome))
}
