//! Typed payloads for each lifecycle request.
//!
//! Deserialised by the protocol adapter from request bodies or query
//! strings. Unknown keys are ignored. The caller context is never part of
//! the wire payload; the adapter fills it from request headers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::Extra;
use crate::fingerprint::{request_fingerprint, FingerprintPart};

pub type Parameters = Map<String, Value>;

// ── Caller context ─────────────────────────────────────────────

/// Platform-supplied identity of the end user behind a request
/// (`X-Broker-API-Originating-Identity`).
#[derive(Debug, Clone, PartialEq)]
pub struct OriginatingIdentity {
    pub platform: String,
    pub value: Value,
}

/// Identity metadata passed through to the backing capability untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerContext {
    pub originating_identity: Option<OriginatingIdentity>,
    /// Username of the authenticated platform principal, if any.
    pub authorization_username: Option<String>,
}

// ── Provision ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionDetails {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip)]
    pub caller: CallerContext,
}

impl ProvisionDetails {
    pub fn new(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            organization_guid: None,
            space_guid: None,
            parameters: None,
            context: None,
            caller: CallerContext::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Identity of the requested configuration: service, plan, parameters.
    pub fn fingerprint(&self) -> String {
        request_fingerprint(
            &self.service_id,
            &self.plan_id,
            self.parameters.as_ref(),
            &[],
        )
    }
}

// ── Update ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviousValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_values: Option<PreviousValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip)]
    pub caller: CallerContext,
}

impl UpdateDetails {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: None,
            parameters: None,
            previous_values: None,
            context: None,
            caller: CallerContext::default(),
        }
    }

    pub fn with_plan(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

// ── Bind ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindDetails {
    pub service_id: String,
    pub plan_id: String,
    /// Deprecated top-level form of `bind_resource.app_guid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_resource: Option<BindResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(skip)]
    pub caller: CallerContext,
}

impl BindDetails {
    pub fn new(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            app_guid: None,
            bind_resource: None,
            parameters: None,
            context: None,
            caller: CallerContext::default(),
        }
    }

    pub fn with_app_guid(mut self, app_guid: impl Into<String>) -> Self {
        let resource = self.bind_resource.get_or_insert_with(BindResource::default);
        resource.app_guid = Some(app_guid.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// The application reference, preferring `bind_resource.app_guid`.
    pub fn effective_app_guid(&self) -> Option<&str> {
        self.bind_resource
            .as_ref()
            .and_then(|r| r.app_guid.as_deref())
            .or(self.app_guid.as_deref())
    }

    pub fn fingerprint(&self) -> String {
        let route = self.bind_resource.as_ref().and_then(|r| r.route.as_deref());
        request_fingerprint(
            &self.service_id,
            &self.plan_id,
            self.parameters.as_ref(),
            &[
                FingerprintPart::new("app_guid", self.effective_app_guid()),
                FingerprintPart::new("route", route),
            ],
        )
    }
}

// ── Removal ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnbindDetails {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip)]
    pub caller: CallerContext,
}

impl UnbindDetails {
    pub fn new(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            caller: CallerContext::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeprovisionDetails {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip)]
    pub caller: CallerContext,
}

impl DeprovisionDetails {
    pub fn new(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            caller: CallerContext::default(),
        }
    }
}
