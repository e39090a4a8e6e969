//! GET /v2/catalog: services and plans offered by every registered backend.

use std::sync::Arc;

use axum::{Extension, Json};
use broker_core::catalog::Catalog;
use broker_core::LifecycleOrchestrator;

pub async fn catalog(Extension(broker): Extension<Arc<LifecycleOrchestrator>>) -> Json<Catalog> {
    Json(broker.catalog().clone())
}
