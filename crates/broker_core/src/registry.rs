//! Broker registry: routes each catalog service to the backend serving it.
//!
//! Several backends may be mounted behind one broker; their catalogs are
//! merged in registration order.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;

use crate::capability::BackingService;
use crate::catalog::{Catalog, PlanRef};
use crate::error::{BrokerError, Result};

pub struct BrokerRegistry {
    catalog: Catalog,
    backends: HashMap<String, Arc<dyn BackingService>>,
}

impl BrokerRegistry {
    /// Merge the catalogs of `backends`. A service id offered by two backends
    /// is a configuration error.
    pub fn new(backends: Vec<Arc<dyn BackingService>>) -> Result<Self> {
        let backend_count = backends.len();
        let mut services = Vec::new();
        let mut by_service: HashMap<String, Arc<dyn BackingService>> = HashMap::new();

        for backend in backends {
            for service in backend.services() {
                if by_service.contains_key(&service.id) {
                    return Err(BrokerError::Internal(anyhow!(
                        "service id {} is offered by more than one backend",
                        service.id
                    )));
                }
                by_service.insert(service.id.clone(), backend.clone());
                services.push(service);
            }
        }

        tracing::info!(
            services = services.len(),
            backends = backend_count,
            "broker registry built"
        );

        Ok(Self {
            catalog: Catalog::new(services),
            backends: by_service,
        })
    }

    pub fn single(backend: Arc<dyn BackingService>) -> Result<Self> {
        Self::new(vec![backend])
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn find_plan(&self, plan_id: &str) -> Option<PlanRef<'_>> {
        self.catalog.find_plan(plan_id)
    }

    pub fn find_plan_in(&self, service_id: &str, plan_id: &str) -> Option<PlanRef<'_>> {
        self.catalog.find_plan_in(service_id, plan_id)
    }

    pub fn backend_for(&self, service_id: &str) -> Result<Arc<dyn BackingService>> {
        self.backends
            .get(service_id)
            .cloned()
            .ok_or_else(|| BrokerError::ServiceNotFound(service_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Service, ServicePlan};
    use crate::testing::FakeBackingService;

    fn backend(service_id: &str, plan_id: &str) -> Arc<dyn BackingService> {
        Arc::new(FakeBackingService::new(vec![Service::new(
            service_id,
            service_id,
            "test service",
            true,
            vec![ServicePlan::new(plan_id, "default", "test plan")],
        )]))
    }

    #[test]
    fn merges_catalogs_and_routes_by_service() {
        let registry =
            BrokerRegistry::new(vec![backend("s1", "p1"), backend("s2", "p2")]).unwrap();
        assert_eq!(registry.catalog().services.len(), 2);
        assert!(registry.backend_for("s2").is_ok());
        assert_eq!(registry.find_plan("p2").unwrap().service.id, "s2");
        assert!(matches!(
            registry.backend_for("s3"),
            Err(BrokerError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn duplicate_service_ids_are_rejected() {
        let result = BrokerRegistry::new(vec![backend("s1", "p1"), backend("s1", "p2")]);
        assert!(matches!(result, Err(BrokerError::Internal(_))));
    }
}
