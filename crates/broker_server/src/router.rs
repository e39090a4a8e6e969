//! Router construction for the broker server.

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, put},
    Extension, Router,
};
use broker_core::LifecycleOrchestrator;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::auth::{basic_auth, BasicAuth, BrokerCredentials};
use crate::middleware::identity::caller_context;
use crate::middleware::version::{require_api_version, ApiVersion, VersionGate};

/// Gates applied to the `/v2` routes.
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Accepted basic-auth pairs. Empty disables authentication.
    pub credentials: Vec<BrokerCredentials>,
    /// `None` disables the `X-Broker-Api-Version` check.
    pub min_api_version: Option<ApiVersion>,
}

/// Build the full axum router with all routes and middleware.
pub fn build_router(broker: Arc<LifecycleOrchestrator>, settings: ServerSettings) -> Router {
    let mut v2 = Router::new()
        .route("/v2/catalog", get(handlers::catalog::catalog))
        .route(
            "/v2/service_instances/:instance_id",
            put(handlers::instances::provision)
                .patch(handlers::instances::update)
                .delete(handlers::instances::deprovision)
                .get(handlers::instances::get_instance),
        )
        .route(
            "/v2/service_instances/:instance_id/last_operation",
            get(handlers::instances::last_operation),
        )
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id",
            put(handlers::bindings::bind)
                .delete(handlers::bindings::unbind)
                .get(handlers::bindings::get_binding),
        )
        .route(
            "/v2/service_instances/:instance_id/service_bindings/:binding_id/last_operation",
            get(handlers::bindings::last_operation),
        )
        // Innermost: sees the username stored by basic_auth.
        .layer(axum_mw::from_fn(caller_context));

    if !settings.credentials.is_empty() {
        v2 = v2
            .layer(axum_mw::from_fn(basic_auth))
            .layer(Extension(BasicAuth::new(settings.credentials)));
    }
    if let Some(minimum) = settings.min_api_version {
        v2 = v2
            .layer(axum_mw::from_fn(require_api_version))
            .layer(Extension(VersionGate(minimum)));
    }

    // Public routes (no auth)
    let public = Router::new().route("/health", get(handlers::health::health));

    public
        .merge(v2)
        .layer(Extension(broker))
        .layer(TraceLayer::new_for_http())
}
