//! Bundled backing service for running the broker without infrastructure.
//!
//! Everything completes synchronously. Instances are bookkeeping only;
//! each binding gets freshly minted credentials that stay valid until
//! unbind.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use broker_core::capability::{
    BackingError, BackingResult, BackingService, BindingMaterial, BindingSpec, LastOperation,
    ProvisionedSpec, RemovalSpec, UpdatedSpec,
};
use broker_core::catalog::{Catalog, Service, ServicePlan};
use broker_core::details::{
    BindDetails, DeprovisionDetails, ProvisionDetails, UnbindDetails, UpdateDetails,
};
use broker_core::tracker::OperationState;
use serde_json::{json, Map};
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct StaticBackingService {
    catalog: Catalog,
    instances: RwLock<HashSet<String>>,
    bindings: RwLock<HashMap<(String, String), BindingMaterial>>,
}

impl StaticBackingService {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            instances: RwLock::new(HashSet::new()),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// One bindable service with two plans; plan changes are allowed.
    pub fn sample() -> Self {
        let service = Service::new(
            "static-credentials",
            "static-credentials",
            "Credentials minted on bind, no backing infrastructure",
            true,
            vec![
                ServicePlan::new("static-shared", "shared", "Shared credentials plan"),
                ServicePlan::new("static-dedicated", "dedicated", "Dedicated credentials plan"),
            ],
        )
        .with_plan_updateable(true);
        Self::new(Catalog::new(vec![service]))
    }

    /// Load the offered catalog from a YAML or JSON document.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let catalog = Catalog::from_yaml_str(&source)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        Ok(Self::new(catalog))
    }
}

fn mint_credentials(instance_id: &str, binding_id: &str) -> BindingMaterial {
    let user = Uuid::new_v4().simple().to_string();
    let mut credentials = Map::new();
    credentials.insert("username".into(), json!(format!("u{}", &user[..12])));
    credentials.insert("password".into(), json!(Uuid::new_v4().simple().to_string()));
    credentials.insert("instance_id".into(), json!(instance_id));
    credentials.insert("binding_id".into(), json!(binding_id));
    BindingMaterial {
        credentials: Some(credentials),
        ..Default::default()
    }
}

#[async_trait]
impl BackingService for StaticBackingService {
    fn services(&self) -> Vec<Service> {
        self.catalog.services.clone()
    }

    async fn provision(
        &self,
        instance_id: &str,
        details: &ProvisionDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<ProvisionedSpec> {
        self.instances.write().await.insert(instance_id.to_string());
        tracing::debug!(instance_id, plan_id = %details.plan_id, "static instance created");
        Ok(ProvisionedSpec::sync())
    }

    async fn update(
        &self,
        instance_id: &str,
        _details: &UpdateDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<UpdatedSpec> {
        if !self.instances.read().await.contains(instance_id) {
            return Err(BackingError::InstanceNotFound);
        }
        Ok(UpdatedSpec::sync())
    }

    async fn deprovision(
        &self,
        instance_id: &str,
        _details: &DeprovisionDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<RemovalSpec> {
        if !self.instances.write().await.remove(instance_id) {
            return Err(BackingError::InstanceNotFound);
        }
        self.bindings
            .write()
            .await
            .retain(|(owner, _), _| owner != instance_id);
        Ok(RemovalSpec::sync())
    }

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _details: &BindDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<BindingSpec> {
        if !self.instances.read().await.contains(instance_id) {
            return Err(BackingError::InstanceNotFound);
        }
        let material = mint_credentials(instance_id, binding_id);
        self.bindings.write().await.insert(
            (instance_id.to_string(), binding_id.to_string()),
            material.clone(),
        );
        Ok(BindingSpec::sync(material))
    }

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        _details: &UnbindDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<RemovalSpec> {
        let key = (instance_id.to_string(), binding_id.to_string());
        match self.bindings.write().await.remove(&key) {
            Some(_) => Ok(RemovalSpec::sync()),
            None => Err(BackingError::BindingNotFound),
        }
    }

    async fn last_operation(
        &self,
        _instance_id: &str,
        _operation: Option<&str>,
    ) -> BackingResult<LastOperation> {
        Ok(LastOperation::new(OperationState::Succeeded, None))
    }

    async fn get_binding(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> BackingResult<BindingMaterial> {
        let key = (instance_id.to_string(), binding_id.to_string());
        self.bindings
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(BackingError::BindingNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use broker_core::outcome::{BindState, ProvisionState, RemovalOutcome};
    use broker_core::{BrokerRegistry, LifecycleOrchestrator};

    fn broker() -> LifecycleOrchestrator {
        let backend = Arc::new(StaticBackingService::sample());
        LifecycleOrchestrator::new(BrokerRegistry::single(backend).unwrap())
    }

    fn password(material: &BindingMaterial) -> String {
        material.credentials.as_ref().unwrap()["password"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn full_lifecycle_against_static_backend() {
        let broker = broker();
        let provisioned = broker
            .provision(
                "i1",
                ProvisionDetails::new("static-credentials", "static-shared"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(provisioned.state, ProvisionState::Created);

        let first = broker
            .bind(
                "i1",
                "b1",
                BindDetails::new("static-credentials", "static-shared"),
                false,
            )
            .await
            .unwrap();
        let second = broker
            .bind(
                "i1",
                "b2",
                BindDetails::new("static-credentials", "static-shared"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(first.state, BindState::Created);
        assert_ne!(password(&first.material), password(&second.material));

        let unbound = broker
            .unbind(
                "i1",
                "b1",
                UnbindDetails::new("static-credentials", "static-shared"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(unbound, RemovalOutcome::Removed);

        let removed = broker
            .deprovision(
                "i1",
                DeprovisionDetails::new("static-credentials", "static-shared"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(removed, RemovalOutcome::Removed);
    }

    #[tokio::test]
    async fn unknown_binding_reports_not_found() {
        let backend = StaticBackingService::sample();
        let err = backend
            .unbind(
                "i1",
                "missing",
                &UnbindDetails::new("static-credentials", "static-shared"),
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackingError::BindingNotFound));
    }

    #[test]
    fn catalog_loads_from_file() {
        let path = std::env::temp_dir().join(format!("catalog-{}.yaml", Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
services:
  - id: svc
    name: svc
    description: from file
    bindable: false
    plans:
      - id: plan
        name: plan
        description: only plan
"#,
        )
        .unwrap();
        let backend = StaticBackingService::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let services = backend.services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].plans[0].id, "plan");
        assert!(!services[0].bindable);
    }

    #[test]
    fn missing_catalog_file_is_an_error() {
        let err = StaticBackingService::from_path(Path::new("/nonexistent/catalog.yaml"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("reading catalog"));
    }
}
