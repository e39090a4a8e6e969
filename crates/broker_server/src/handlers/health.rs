//! GET /health: liveness probe, outside auth and version gating.

use std::sync::Arc;

use axum::{Extension, Json};
use broker_core::LifecycleOrchestrator;
use serde_json::{json, Value};

pub async fn health(Extension(broker): Extension<Arc<LifecycleOrchestrator>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "services": broker.catalog().services.len(),
        "operations_in_flight": broker.tracker().active_count().await,
    }))
}
