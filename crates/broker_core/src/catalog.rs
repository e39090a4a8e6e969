//! Catalog model: the services and plans this broker offers.
//!
//! Every entity carries a fixed core schema plus an open `extra` map so that
//! vendor-specific catalog fields survive a load/serialize round unchanged.
//! The catalog is read-only once constructed.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Additional key/value pairs preserved verbatim on serialization.
pub type Extra = Map<String, Value>;

// ── Service ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub bindable: bool,
    pub plans: Vec<ServicePlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ServiceMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_client: Option<ServiceDashboardClient>,
    #[serde(default)]
    pub plan_updateable: bool,
    #[serde(default)]
    pub instances_retrievable: bool,
    #[serde(default)]
    pub bindings_retrievable: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        bindable: bool,
        plans: Vec<ServicePlan>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            bindable,
            plans,
            tags: None,
            requires: None,
            metadata: None,
            dashboard_client: None,
            plan_updateable: false,
            instances_retrievable: false,
            bindings_retrievable: false,
            extra: Extra::new(),
        }
    }

    pub fn with_plan_updateable(mut self, plan_updateable: bool) -> Self {
        self.plan_updateable = plan_updateable;
        self
    }

    pub fn plan(&self, plan_id: &str) -> Option<&ServicePlan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub display_name: String,
    pub image_url: String,
    pub long_description: String,
    pub provider_display_name: String,
    pub documentation_url: String,
    pub support_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shareable: Option<bool>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDashboardClient {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── Plan ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ServicePlanMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    /// Overrides the owning service's `bindable` flag when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Schemas>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ServicePlan {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            metadata: None,
            free: None,
            bindable: None,
            schemas: None,
            extra: Extra::new(),
        }
    }

    pub fn with_bindable(mut self, bindable: bool) -> Self {
        self.bindable = Some(bindable);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServicePlanMetadata {
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub costs: Option<Vec<ServicePlanCost>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlanCost {
    pub amount: BTreeMap<String, f64>,
    pub unit: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schemas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_instance: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_binding: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── Catalog ────────────────────────────────────────────────────

/// A plan together with the service that owns it.
#[derive(Debug, Clone, Copy)]
pub struct PlanRef<'a> {
    pub service: &'a Service,
    pub plan: &'a ServicePlan,
}

impl PlanRef<'_> {
    pub fn is_bindable(&self) -> bool {
        self.plan.bindable.unwrap_or(self.service.bindable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub services: Vec<Service>,
}

impl Catalog {
    /// Build a catalog, flagging duplicate plan ids as a configuration warning.
    /// Catalog-wide lookups stay first-match-wins; request routing uses
    /// [`Catalog::find_plan_in`].
    pub fn new(services: Vec<Service>) -> Self {
        let catalog = Self { services };
        for plan_id in catalog.duplicate_plan_ids() {
            tracing::warn!(
                plan_id = %plan_id,
                "plan id appears in more than one service; catalog-wide lookups pick the first"
            );
        }
        catalog
    }

    /// Parse a catalog document (`services: [...]`). YAML is a superset of
    /// JSON, so both formats are accepted.
    pub fn from_yaml_str(source: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let parsed: Catalog = serde_yaml::from_str(source)?;
        Ok(Self::new(parsed.services))
    }

    /// Scans every service; plan ids are unique only by convention.
    pub fn find_plan(&self, plan_id: &str) -> Option<PlanRef<'_>> {
        self.services.iter().find_map(|service| {
            service
                .plan(plan_id)
                .map(|plan| PlanRef { service, plan })
        })
    }

    pub fn find_service(&self, service_id: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.id == service_id)
    }

    /// Plan `plan_id` as offered by `service_id`.
    pub fn find_plan_in(&self, service_id: &str, plan_id: &str) -> Option<PlanRef<'_>> {
        let service = self.find_service(service_id)?;
        let plan = service.plan(plan_id)?;
        Some(PlanRef { service, plan })
    }

    pub fn duplicate_plan_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for plan in self.services.iter().flat_map(|s| s.plans.iter()) {
            if !seen.insert(plan.id.as_str()) && !duplicates.contains(&plan.id) {
                duplicates.push(plan.id.clone());
            }
        }
        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_services() -> Catalog {
        Catalog::new(vec![
            Service::new(
                "s1",
                "first",
                "first service",
                true,
                vec![ServicePlan::new("p1", "small", "small plan")],
            ),
            Service::new(
                "s2",
                "second",
                "second service",
                false,
                vec![
                    ServicePlan::new("p2", "large", "large plan").with_bindable(true),
                    ServicePlan::new("p1", "shadow", "duplicate id"),
                ],
            ),
        ])
    }

    #[test]
    fn find_plan_scans_all_services() {
        let catalog = two_services();
        let found = catalog.find_plan("p2").unwrap();
        assert_eq!(found.service.id, "s2");
        assert_eq!(found.plan.name, "large");
        assert!(catalog.find_plan("missing").is_none());
    }

    #[test]
    fn duplicate_plan_ids_resolve_to_first_match() {
        let catalog = two_services();
        assert_eq!(catalog.duplicate_plan_ids(), vec!["p1".to_string()]);
        assert_eq!(catalog.find_plan("p1").unwrap().service.id, "s1");
    }

    #[test]
    fn find_plan_in_scopes_to_the_service() {
        let catalog = two_services();
        let shadow = catalog.find_plan_in("s2", "p1").unwrap();
        assert_eq!(shadow.service.id, "s2");
        assert_eq!(shadow.plan.name, "shadow");
        assert!(catalog.find_plan_in("s1", "p2").is_none());
        assert!(catalog.find_plan_in("s3", "p1").is_none());
    }

    #[test]
    fn plan_bindable_overrides_service_default() {
        let catalog = two_services();
        assert!(catalog.find_plan("p2").unwrap().is_bindable());
        assert!(catalog.find_plan("p1").unwrap().is_bindable());

        let shadow = PlanRef {
            service: &catalog.services[1],
            plan: &catalog.services[1].plans[1],
        };
        assert!(!shadow.is_bindable());
    }

    #[test]
    fn minimal_service_serializes_flags_and_omits_absent_fields() {
        let service = Service::new(
            "s1",
            "service_name",
            "service_description",
            true,
            vec![ServicePlan::new("p1", "default", "plan_description")],
        );
        let value = serde_json::to_value(&service).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "s1",
                "name": "service_name",
                "description": "service_description",
                "bindable": true,
                "plan_updateable": false,
                "instances_retrievable": false,
                "bindings_retrievable": false,
                "plans": [{"id": "p1", "name": "default", "description": "plan_description"}]
            })
        );
    }

    #[test]
    fn extra_fields_survive_round_trip() {
        let source = r#"
services:
  - id: s1
    name: svc
    description: desc
    bindable: true
    custom_service_field: 7
    metadata:
      displayName: Svc
      imageUrl: http://img
      longDescription: long
      providerDisplayName: provider
      documentationUrl: http://docs
      supportUrl: http://support
      custom_field1: custom_field1
    plans:
      - id: p1
        name: default
        description: plan
        metadata:
          displayName: Default
          costs:
            - amount: { requests: 1 }
              unit: unit
          custom_field2: custom_field2
"#;
        let catalog = Catalog::from_yaml_str(source).unwrap();
        let service = &catalog.services[0];
        assert_eq!(service.extra.get("custom_service_field"), Some(&json!(7)));

        let value = serde_json::to_value(service).unwrap();
        assert_eq!(value["metadata"]["custom_field1"], json!("custom_field1"));
        assert_eq!(value["metadata"]["displayName"], json!("Svc"));
        assert_eq!(
            value["plans"][0]["metadata"]["custom_field2"],
            json!("custom_field2")
        );
        assert_eq!(
            value["plans"][0]["metadata"]["costs"][0]["amount"]["requests"],
            json!(1.0)
        );
    }
}
