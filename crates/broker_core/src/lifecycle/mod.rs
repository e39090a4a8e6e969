//! LifecycleOrchestrator: instance and binding state machine.
//!
//! Every mutating operation runs in three phases:
//!   1. Claim: under the record's slot lock, classify the request against
//!      existing state (fresh, replay, conflict, busy) and mark the record
//!      pending.
//!   2. Call the backing service with no lock held.
//!   3. Finalize: relock, then settle, track, or roll back the record.
//!
//! Lock order when both are needed: record slot, then tracker slot.

mod bindings;
mod instances;
mod polling;

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::OwnedMutexGuard;

use crate::capability::{BackingError, BackingService};
use crate::catalog::Catalog;
use crate::error::{BrokerError, Result};
use crate::records::{BindingKey, BindingRecord, InstanceRecord, RecordStore};
use crate::registry::BrokerRegistry;
use crate::tracker::{OperationTracker, RecordKey};

type InstanceSlot = OwnedMutexGuard<Option<InstanceRecord>>;
type BindingSlot = OwnedMutexGuard<Option<BindingRecord>>;

/// Catalog facts about the plan a request targets.
struct ResolvedPlan {
    backend: Arc<dyn BackingService>,
    bindable: bool,
    plan_updateable: bool,
}

pub struct LifecycleOrchestrator {
    registry: BrokerRegistry,
    records: RecordStore,
    tracker: OperationTracker,
}

impl LifecycleOrchestrator {
    pub fn new(registry: BrokerRegistry) -> Self {
        Self {
            registry,
            records: RecordStore::new(),
            tracker: OperationTracker::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        self.registry.catalog()
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    /// Look up `plan_id` within `service_id`. Plan ids only need to be
    /// unique per service, so a plan offered elsewhere is a validation
    /// failure, not a missing plan.
    fn resolve(&self, service_id: &str, plan_id: &str) -> Result<ResolvedPlan> {
        let found = self.registry.find_plan_in(service_id, plan_id);
        let Some(found) = found else {
            return Err(match self.registry.find_plan(plan_id) {
                Some(_) => BrokerError::Validation(format!(
                    "plan {plan_id} does not belong to service {service_id}"
                )),
                None => BrokerError::PlanNotFound(plan_id.to_string()),
            });
        };
        Ok(ResolvedPlan {
            backend: self.registry.backend_for(service_id)?,
            bindable: found.is_bindable(),
            plan_updateable: found.service.plan_updateable,
        })
    }

    /// Empty the instance slot and let the store reclaim it.
    async fn clear_instance(&self, key: &String, mut slot: InstanceSlot) {
        *slot = None;
        drop(slot);
        self.records.instances.release(key).await;
    }

    async fn clear_binding(&self, key: &BindingKey, mut slot: BindingSlot) {
        *slot = None;
        drop(slot);
        self.records.bindings.release(key).await;
    }
}

/// Translate a backing-service failure into the broker taxonomy.
fn lift(err: BackingError, key: &RecordKey) -> BrokerError {
    match err {
        BackingError::AsyncRequired => BrokerError::AsyncRequired,
        BackingError::AppGuidRequired => BrokerError::AppGuidRequired,
        BackingError::InvalidParameters(msg) => BrokerError::InvalidParameters(msg),
        BackingError::Unsupported(what) => BrokerError::Unsupported(what),
        BackingError::InstanceNotFound => match key {
            RecordKey::Instance(id) | RecordKey::Binding(id, _) => {
                BrokerError::InstanceNotFound(id.clone())
            }
        },
        BackingError::BindingNotFound => match key {
            RecordKey::Binding(instance_id, binding_id) => BrokerError::BindingNotFound {
                instance_id: instance_id.clone(),
                binding_id: binding_id.clone(),
            },
            RecordKey::Instance(id) => BrokerError::InstanceNotFound(id.clone()),
        },
        BackingError::Internal(e) => BrokerError::Internal(e),
    }
}

/// The record disappeared between claim and finalize. Only possible if
/// the pending marker was ignored somewhere.
fn vanished(key: &RecordKey) -> BrokerError {
    BrokerError::Internal(anyhow!("{key} vanished while an operation was pending"))
}

fn busy(key: &RecordKey) -> BrokerError {
    BrokerError::ConcurrentAccess(format!("{key} has an operation in progress"))
}
