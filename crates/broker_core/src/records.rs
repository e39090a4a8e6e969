//! Instance and binding records owned by the lifecycle orchestrator.
//!
//! A record is only mutated under its slot lock. While the backing service
//! is being called the record carries `pending = true`, so overlapping
//! requests see an operation in progress instead of waiting on the lock.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::capability::BindingMaterial;
use crate::details::{BindDetails, Parameters, ProvisionDetails};
use crate::slots::KeyedSlots;
use crate::tracker::OperationToken;

// ── Instance ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Provisioning,
    Provisioned,
    Updating,
    Deprovisioning,
    Failed,
}

impl InstanceState {
    /// States with a transition in flight.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::Provisioning | Self::Updating | Self::Deprovisioning
        )
    }
}

/// Plan and parameters requested by an update, applied only once it succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUpdate {
    pub plan_id: String,
    pub parameters: Option<Parameters>,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Option<Parameters>,
    pub fingerprint: String,
    pub state: InstanceState,
    pub dashboard_url: Option<String>,
    pub operation: Option<OperationToken>,
    /// A backing-service call for this record has not returned yet.
    pub pending: bool,
    pub staged: Option<StagedUpdate>,
    rollback_state: Option<InstanceState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// A fresh record for an in-flight provision.
    pub fn provisioning(instance_id: &str, details: &ProvisionDetails) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.to_string(),
            service_id: details.service_id.clone(),
            plan_id: details.plan_id.clone(),
            parameters: details.parameters.clone(),
            fingerprint: details.fingerprint(),
            state: InstanceState::Provisioning,
            dashboard_url: None,
            operation: None,
            pending: true,
            staged: None,
            rollback_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending || self.state.is_transitional()
    }

    /// Move into a transitional state, remembering where to fall back to.
    pub fn enter(&mut self, state: InstanceState) {
        self.rollback_state = Some(self.state);
        self.state = state;
        self.pending = true;
        self.updated_at = Utc::now();
    }

    /// Undo the last `enter`, discarding any staged update.
    pub fn abort(&mut self) {
        if let Some(previous) = self.rollback_state.take() {
            self.state = previous;
        }
        self.pending = false;
        self.staged = None;
        self.operation = None;
        self.updated_at = Utc::now();
    }

    pub fn settle(&mut self, state: InstanceState) {
        self.state = state;
        self.pending = false;
        self.operation = None;
        self.rollback_state = None;
        self.updated_at = Utc::now();
    }

    /// The backend accepted the work asynchronously; wait for polls.
    pub fn track(&mut self, token: OperationToken) {
        self.operation = Some(token);
        self.pending = false;
        self.updated_at = Utc::now();
    }

    pub fn apply_staged(&mut self) {
        if let Some(staged) = self.staged.take() {
            self.plan_id = staged.plan_id;
            self.parameters = staged.parameters;
            self.fingerprint = staged.fingerprint;
        }
    }
}

// ── Binding ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    Creating,
    Bound,
    Deleting,
    Failed,
}

impl BindingState {
    pub fn is_transitional(self) -> bool {
        matches!(self, Self::Creating | Self::Deleting)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingRecord {
    pub instance_id: String,
    pub binding_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub parameters: Option<Parameters>,
    pub fingerprint: String,
    pub state: BindingState,
    /// `None` until the backend has produced credentials.
    pub material: Option<BindingMaterial>,
    pub operation: Option<OperationToken>,
    pub pending: bool,
    rollback_state: Option<BindingState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BindingRecord {
    pub fn creating(instance_id: &str, binding_id: &str, details: &BindDetails) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.to_string(),
            binding_id: binding_id.to_string(),
            service_id: details.service_id.clone(),
            plan_id: details.plan_id.clone(),
            parameters: details.parameters.clone(),
            fingerprint: details.fingerprint(),
            state: BindingState::Creating,
            material: None,
            operation: None,
            pending: true,
            rollback_state: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending || self.state.is_transitional()
    }

    pub fn enter(&mut self, state: BindingState) {
        self.rollback_state = Some(self.state);
        self.state = state;
        self.pending = true;
        self.updated_at = Utc::now();
    }

    pub fn abort(&mut self) {
        if let Some(previous) = self.rollback_state.take() {
            self.state = previous;
        }
        self.pending = false;
        self.operation = None;
        self.updated_at = Utc::now();
    }

    pub fn settle(&mut self, state: BindingState) {
        self.state = state;
        self.pending = false;
        self.operation = None;
        self.rollback_state = None;
        self.updated_at = Utc::now();
    }

    pub fn track(&mut self, token: OperationToken) {
        self.operation = Some(token);
        self.pending = false;
        self.updated_at = Utc::now();
    }
}

// ── Store ──────────────────────────────────────────────────────

pub type BindingKey = (String, String);

/// In-memory record store with one lock slot per record.
#[derive(Default)]
pub struct RecordStore {
    pub instances: KeyedSlots<String, Option<InstanceRecord>>,
    pub bindings: KeyedSlots<BindingKey, Option<BindingRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding_key(instance_id: &str, binding_id: &str) -> BindingKey {
        (instance_id.to_string(), binding_id.to_string())
    }
}
