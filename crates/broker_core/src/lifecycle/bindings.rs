//! Bind, unbind and read for service bindings.

use crate::capability::{BackingError, Completion};
use crate::details::{BindDetails, UnbindDetails};
use crate::error::{BrokerError, Result};
use crate::outcome::{BindOutcome, BindState, BindingSnapshot, RemovalOutcome};
use crate::records::{BindingRecord, BindingState, InstanceState, RecordStore};
use crate::tracker::{OperationKind, RecordKey};

use super::{busy, lift, vanished, LifecycleOrchestrator};

impl LifecycleOrchestrator {
    // ── Bind ───────────────────────────────────────────────────

    pub async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: BindDetails,
        accepts_incomplete: bool,
    ) -> Result<BindOutcome> {
        let target = self.resolve(&details.service_id, &details.plan_id)?;
        if !target.bindable {
            return Err(BrokerError::Validation(format!(
                "plan {} is not bindable",
                details.plan_id
            )));
        }
        self.ensure_bindable_instance(instance_id).await?;

        let key = RecordStore::binding_key(instance_id, binding_id);
        let record_key = RecordKey::binding(instance_id, binding_id);

        {
            let mut slot = self.records.bindings.lock(&key).await;
            if let Some(existing) = slot.as_ref() {
                if existing.state != BindingState::Failed {
                    return replay_bind(existing, &details, &record_key, accepts_incomplete);
                }
                tracing::info!(instance_id, binding_id, "replacing failed binding");
            }
            *slot = Some(BindingRecord::creating(instance_id, binding_id, &details));
        }

        let result = target
            .backend
            .bind(instance_id, binding_id, &details, accepts_incomplete)
            .await;

        let mut slot = self.records.bindings.lock(&key).await;
        let spec = match result {
            Ok(spec) if spec.completion.is_async() && !accepts_incomplete => {
                tracing::warn!(
                    instance_id,
                    binding_id,
                    "backend went async without accepts_incomplete"
                );
                self.clear_binding(&key, slot).await;
                return Err(BrokerError::AsyncRequired);
            }
            Ok(spec) => spec,
            Err(e) => {
                self.clear_binding(&key, slot).await;
                return Err(lift(e, &record_key));
            }
        };

        let record = slot.as_mut().ok_or_else(|| vanished(&record_key))?;
        match spec.completion {
            Completion::Sync => {
                record.material = Some(spec.material.clone());
                record.settle(BindingState::Bound);
                tracing::info!(instance_id, binding_id, "binding created");
                Ok(BindOutcome {
                    state: BindState::Created,
                    material: spec.material,
                    operation: None,
                })
            }
            Completion::Async { operation } => {
                let token = match self
                    .tracker
                    .begin(&record_key, OperationKind::Bind, operation)
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        self.clear_binding(&key, slot).await;
                        return Err(e);
                    }
                };
                record.track(token.clone());
                tracing::info!(instance_id, binding_id, %token, "binding accepted");
                Ok(BindOutcome {
                    state: BindState::Accepted,
                    material: Default::default(),
                    operation: Some(token),
                })
            }
        }
    }

    /// Bindings attach to an instance that exists and has settled.
    async fn ensure_bindable_instance(&self, instance_id: &str) -> Result<()> {
        let key = instance_id.to_string();
        let slot = self.records.instances.lock(&key).await;
        let Some(instance) = slot.as_ref() else {
            drop(slot);
            self.records.instances.release(&key).await;
            return Err(BrokerError::InstanceNotFound(instance_id.to_string()));
        };
        match instance.state {
            InstanceState::Provisioned | InstanceState::Updating => Ok(()),
            InstanceState::Failed => Err(BrokerError::Validation(format!(
                "instance {instance_id} failed to provision"
            ))),
            InstanceState::Provisioning | InstanceState::Deprovisioning => {
                Err(busy(&RecordKey::instance(instance_id)))
            }
        }
    }

    // ── Unbind ─────────────────────────────────────────────────

    pub async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: UnbindDetails,
        accepts_incomplete: bool,
    ) -> Result<RemovalOutcome> {
        let target = self.resolve(&details.service_id, &details.plan_id)?;
        let key = RecordStore::binding_key(instance_id, binding_id);
        let record_key = RecordKey::binding(instance_id, binding_id);

        {
            let mut slot = self.records.bindings.lock(&key).await;
            let Some(record) = slot.as_mut() else {
                drop(slot);
                self.records.bindings.release(&key).await;
                tracing::debug!(instance_id, binding_id, "unbind of unknown binding");
                return Ok(RemovalOutcome::Gone);
            };
            if record.is_busy() {
                return Err(busy(&record_key));
            }
            record.enter(BindingState::Deleting);
        }

        let result = target
            .backend
            .unbind(instance_id, binding_id, &details, accepts_incomplete)
            .await;

        let mut slot = self.records.bindings.lock(&key).await;
        let spec = match result {
            Ok(spec) => spec,
            Err(BackingError::BindingNotFound) => {
                self.clear_binding(&key, slot).await;
                self.tracker.forget(&record_key).await;
                tracing::info!(
                    instance_id,
                    binding_id,
                    "backend reports binding already gone"
                );
                return Ok(RemovalOutcome::Gone);
            }
            Err(e) => {
                if let Some(record) = slot.as_mut() {
                    record.abort();
                }
                return Err(lift(e, &record_key));
            }
        };

        match spec.completion {
            Completion::Async { .. } if !accepts_incomplete => {
                if let Some(record) = slot.as_mut() {
                    record.abort();
                }
                Err(BrokerError::AsyncRequired)
            }
            Completion::Sync => {
                self.clear_binding(&key, slot).await;
                tracing::info!(instance_id, binding_id, "binding removed");
                Ok(RemovalOutcome::Removed)
            }
            Completion::Async { operation } => {
                let record = slot.as_mut().ok_or_else(|| vanished(&record_key))?;
                let token = match self
                    .tracker
                    .begin(&record_key, OperationKind::Unbind, operation)
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        record.abort();
                        return Err(e);
                    }
                };
                record.track(token.clone());
                tracing::info!(instance_id, binding_id, %token, "unbind accepted");
                Ok(RemovalOutcome::Accepted(token))
            }
        }
    }

    // ── Read ───────────────────────────────────────────────────

    /// Snapshot of a bound binding. Material for a binding created
    /// asynchronously is fetched from the backend on first read.
    pub async fn get_binding(
        &self,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<BindingSnapshot> {
        let key = RecordStore::binding_key(instance_id, binding_id);
        let record_key = RecordKey::binding(instance_id, binding_id);
        let not_found = || BrokerError::BindingNotFound {
            instance_id: instance_id.to_string(),
            binding_id: binding_id.to_string(),
        };

        let service_id = {
            let slot = self.records.bindings.lock(&key).await;
            let Some(record) = slot.as_ref() else {
                drop(slot);
                self.records.bindings.release(&key).await;
                return Err(not_found());
            };
            match record.state {
                BindingState::Creating | BindingState::Failed => return Err(not_found()),
                BindingState::Deleting => return Err(busy(&record_key)),
                BindingState::Bound => {}
            }
            if record.material.is_some() {
                return Ok(snapshot(record));
            }
            record.service_id.clone()
        };

        let backend = self.registry.backend_for(&service_id)?;
        let material = backend
            .get_binding(instance_id, binding_id)
            .await
            .map_err(|e| lift(e, &record_key))?;

        let mut slot = self.records.bindings.lock(&key).await;
        let record = slot.as_mut().ok_or_else(not_found)?;
        if record.state != BindingState::Bound {
            return Err(busy(&record_key));
        }
        if record.material.is_none() {
            record.material = Some(material);
        }
        Ok(snapshot(record))
    }
}

fn snapshot(record: &BindingRecord) -> BindingSnapshot {
    BindingSnapshot {
        instance_id: record.instance_id.clone(),
        binding_id: record.binding_id.clone(),
        material: record.material.clone().unwrap_or_default(),
        parameters: record.parameters.clone(),
    }
}

/// Classify a bind against a binding that already has a record.
fn replay_bind(
    existing: &BindingRecord,
    details: &BindDetails,
    record_key: &RecordKey,
    accepts_incomplete: bool,
) -> Result<BindOutcome> {
    if existing.fingerprint != details.fingerprint() {
        return Err(BrokerError::BindingAlreadyExists {
            instance_id: existing.instance_id.clone(),
            binding_id: existing.binding_id.clone(),
        });
    }
    if existing.pending {
        return Err(busy(record_key));
    }
    match existing.state {
        BindingState::Bound => Ok(BindOutcome {
            state: BindState::AlreadyExists,
            material: existing.material.clone().unwrap_or_default(),
            operation: None,
        }),
        BindingState::Creating if existing.operation.is_some() => {
            if !accepts_incomplete {
                return Err(BrokerError::AsyncRequired);
            }
            Ok(BindOutcome {
                state: BindState::Accepted,
                material: Default::default(),
                operation: existing.operation.clone(),
            })
        }
        _ => Err(busy(record_key)),
    }
}
