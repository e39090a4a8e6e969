//! Typed outcomes returned by the lifecycle orchestrator.
//!
//! The protocol adapter maps each variant to a status code and body; nothing
//! here knows about HTTP.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capability::BindingMaterial;
use crate::details::Parameters;
use crate::tracker::{OperationState, OperationToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Created,
    /// Idempotent replay of a completed provision.
    AlreadyExists,
    /// Work continues asynchronously; poll with the operation token.
    Accepted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionOutcome {
    pub state: ProvisionState,
    pub dashboard_url: Option<String>,
    pub operation: Option<OperationToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Updated,
    Accepted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub state: UpdateState,
    pub dashboard_url: Option<String>,
    pub operation: Option<OperationToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Created,
    AlreadyExists,
    Accepted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindOutcome {
    pub state: BindState,
    pub material: BindingMaterial,
    pub operation: Option<OperationToken>,
}

/// Result of an unbind or deprovision.
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    Removed,
    Accepted(OperationToken),
    /// Nothing to remove; deletion is already satisfied.
    Gone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastOperationStatus {
    pub state: OperationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LastOperationOutcome {
    Status(LastOperationStatus),
    /// The record no longer exists.
    Gone,
    /// The record exists but the token is unknown or already completed.
    UnknownOperation,
}

/// Read view of a provisioned instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read view of a bound binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingSnapshot {
    pub instance_id: String,
    pub binding_id: String,
    #[serde(flatten)]
    pub material: BindingMaterial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}
