//! Provision, update, deprovision and read for service instances.

use crate::capability::{BackingError, Completion};
use crate::details::{DeprovisionDetails, ProvisionDetails, UpdateDetails};
use crate::error::{BrokerError, Result};
use crate::fingerprint::request_fingerprint;
use crate::outcome::{
    InstanceSnapshot, ProvisionOutcome, ProvisionState, RemovalOutcome, UpdateOutcome,
    UpdateState,
};
use crate::records::{InstanceRecord, InstanceState, StagedUpdate};
use crate::tracker::{OperationKind, RecordKey};

use super::{busy, lift, vanished, LifecycleOrchestrator};

impl LifecycleOrchestrator {
    // ── Provision ──────────────────────────────────────────────

    pub async fn provision(
        &self,
        instance_id: &str,
        details: ProvisionDetails,
        accepts_incomplete: bool,
    ) -> Result<ProvisionOutcome> {
        let target = self.resolve(&details.service_id, &details.plan_id)?;
        let key = instance_id.to_string();
        let record_key = RecordKey::instance(instance_id);

        {
            let mut slot = self.records.instances.lock(&key).await;
            if let Some(existing) = slot.as_ref() {
                if existing.state != InstanceState::Failed {
                    return replay_provision(existing, &details, &record_key, accepts_incomplete);
                }
                tracing::info!(instance_id, "replacing failed instance with a new attempt");
            }
            *slot = Some(InstanceRecord::provisioning(instance_id, &details));
        }

        let result = target
            .backend
            .provision(instance_id, &details, accepts_incomplete)
            .await;

        let mut slot = self.records.instances.lock(&key).await;
        let spec = match result {
            Ok(spec) if spec.completion.is_async() && !accepts_incomplete => {
                tracing::warn!(instance_id, "backend went async without accepts_incomplete");
                self.clear_instance(&key, slot).await;
                return Err(BrokerError::AsyncRequired);
            }
            Ok(spec) => spec,
            Err(e) => {
                self.clear_instance(&key, slot).await;
                return Err(lift(e, &record_key));
            }
        };

        let record = slot.as_mut().ok_or_else(|| vanished(&record_key))?;
        record.dashboard_url = spec.dashboard_url.clone();

        match spec.completion {
            Completion::Sync => {
                record.settle(InstanceState::Provisioned);
                tracing::info!(instance_id, plan_id = %details.plan_id, "instance provisioned");
                Ok(ProvisionOutcome {
                    state: ProvisionState::Created,
                    dashboard_url: spec.dashboard_url,
                    operation: None,
                })
            }
            Completion::Async { operation } => {
                let token = match self
                    .tracker
                    .begin(&record_key, OperationKind::Provision, operation)
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        self.clear_instance(&key, slot).await;
                        return Err(e);
                    }
                };
                record.track(token.clone());
                tracing::info!(instance_id, %token, "instance provisioning accepted");
                Ok(ProvisionOutcome {
                    state: ProvisionState::Accepted,
                    dashboard_url: spec.dashboard_url,
                    operation: Some(token),
                })
            }
        }
    }

    // ── Update ─────────────────────────────────────────────────

    pub async fn update(
        &self,
        instance_id: &str,
        details: UpdateDetails,
        accepts_incomplete: bool,
    ) -> Result<UpdateOutcome> {
        let service = self
            .catalog()
            .find_service(&details.service_id)
            .ok_or_else(|| BrokerError::ServiceNotFound(details.service_id.clone()))?;
        let plan_updateable = match details.plan_id.as_deref() {
            Some(plan_id) => self.resolve(&details.service_id, plan_id)?.plan_updateable,
            None => service.plan_updateable,
        };
        let backend = self.registry.backend_for(&details.service_id)?;
        let key = instance_id.to_string();
        let record_key = RecordKey::instance(instance_id);

        {
            let mut slot = self.records.instances.lock(&key).await;
            let Some(record) = slot.as_mut() else {
                drop(slot);
                self.records.instances.release(&key).await;
                return Err(BrokerError::InstanceNotFound(instance_id.to_string()));
            };
            if record.is_busy() {
                return Err(busy(&record_key));
            }
            if record.state == InstanceState::Failed {
                return Err(BrokerError::Validation(format!(
                    "instance {instance_id} failed to provision and cannot be updated"
                )));
            }
            if record.service_id != details.service_id {
                return Err(BrokerError::Validation(format!(
                    "instance {instance_id} belongs to service {}",
                    record.service_id
                )));
            }

            let plan_id = details
                .plan_id
                .clone()
                .unwrap_or_else(|| record.plan_id.clone());
            if plan_id != record.plan_id && !plan_updateable {
                return Err(BrokerError::Validation(format!(
                    "service {} does not support plan changes",
                    details.service_id
                )));
            }
            let parameters = details
                .parameters
                .clone()
                .or_else(|| record.parameters.clone());
            let fingerprint =
                request_fingerprint(&details.service_id, &plan_id, parameters.as_ref(), &[]);

            record.enter(InstanceState::Updating);
            record.staged = Some(StagedUpdate {
                plan_id,
                parameters,
                fingerprint,
            });
        }

        let result = backend
            .update(instance_id, &details, accepts_incomplete)
            .await;

        let mut slot = self.records.instances.lock(&key).await;
        let record = slot.as_mut().ok_or_else(|| vanished(&record_key))?;
        let spec = match result {
            Ok(spec) if spec.completion.is_async() && !accepts_incomplete => {
                record.abort();
                return Err(BrokerError::AsyncRequired);
            }
            Ok(spec) => spec,
            Err(e) => {
                record.abort();
                return Err(lift(e, &record_key));
            }
        };

        if spec.dashboard_url.is_some() {
            record.dashboard_url = spec.dashboard_url.clone();
        }

        match spec.completion {
            Completion::Sync => {
                record.apply_staged();
                record.settle(InstanceState::Provisioned);
                tracing::info!(instance_id, plan_id = %record.plan_id, "instance updated");
                Ok(UpdateOutcome {
                    state: UpdateState::Updated,
                    dashboard_url: spec.dashboard_url,
                    operation: None,
                })
            }
            Completion::Async { operation } => {
                let token = match self
                    .tracker
                    .begin(&record_key, OperationKind::Update, operation)
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        record.abort();
                        return Err(e);
                    }
                };
                record.track(token.clone());
                tracing::info!(instance_id, %token, "instance update accepted");
                Ok(UpdateOutcome {
                    state: UpdateState::Accepted,
                    dashboard_url: spec.dashboard_url,
                    operation: Some(token),
                })
            }
        }
    }

    // ── Deprovision ────────────────────────────────────────────

    pub async fn deprovision(
        &self,
        instance_id: &str,
        details: DeprovisionDetails,
        accepts_incomplete: bool,
    ) -> Result<RemovalOutcome> {
        let target = self.resolve(&details.service_id, &details.plan_id)?;
        let key = instance_id.to_string();
        let record_key = RecordKey::instance(instance_id);

        {
            let mut slot = self.records.instances.lock(&key).await;
            let Some(record) = slot.as_mut() else {
                drop(slot);
                self.records.instances.release(&key).await;
                tracing::debug!(instance_id, "deprovision of unknown instance");
                return Ok(RemovalOutcome::Gone);
            };
            if record.is_busy() {
                return Err(busy(&record_key));
            }
            record.enter(InstanceState::Deprovisioning);
        }

        let result = target
            .backend
            .deprovision(instance_id, &details, accepts_incomplete)
            .await;

        let mut slot = self.records.instances.lock(&key).await;
        let spec = match result {
            Ok(spec) => spec,
            Err(BackingError::InstanceNotFound) => {
                self.clear_instance(&key, slot).await;
                self.tracker.forget(&record_key).await;
                tracing::info!(instance_id, "backend reports instance already gone");
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
                self.clear_instance(&key, slot).await;
                tracing::info!(instance_id, "instance deprovisioned");
                Ok(RemovalOutcome::Removed)
            }
            Completion::Async { operation } => {
                let record = slot.as_mut().ok_or_else(|| vanished(&record_key))?;
                let token = match self
                    .tracker
                    .begin(&record_key, OperationKind::Deprovision, operation)
                    .await
                {
                    Ok(token) => token,
                    Err(e) => {
                        record.abort();
                        return Err(e);
                    }
                };
                record.track(token.clone());
                tracing::info!(instance_id, %token, "instance deprovisioning accepted");
                Ok(RemovalOutcome::Accepted(token))
            }
        }
    }

    // ── Read ───────────────────────────────────────────────────

    /// Snapshot of a provisioned instance. Instances still provisioning, or
    /// whose provisioning failed, do not exist yet as far as readers care.
    pub async fn get_instance(&self, instance_id: &str) -> Result<InstanceSnapshot> {
        let key = instance_id.to_string();
        let slot = self.records.instances.lock(&key).await;
        let Some(record) = slot.as_ref() else {
            drop(slot);
            self.records.instances.release(&key).await;
            return Err(BrokerError::InstanceNotFound(instance_id.to_string()));
        };

        match record.state {
            InstanceState::Provisioning | InstanceState::Failed => {
                Err(BrokerError::InstanceNotFound(instance_id.to_string()))
            }
            InstanceState::Updating | InstanceState::Deprovisioning => {
                Err(busy(&RecordKey::instance(instance_id)))
            }
            InstanceState::Provisioned => Ok(InstanceSnapshot {
                instance_id: record.instance_id.clone(),
                service_id: record.service_id.clone(),
                plan_id: record.plan_id.clone(),
                dashboard_url: record.dashboard_url.clone(),
                parameters: record.parameters.clone(),
                created_at: record.created_at,
                updated_at: record.updated_at,
            }),
        }
    }
}

/// Classify a provision against an instance that already has a record.
fn replay_provision(
    existing: &InstanceRecord,
    details: &ProvisionDetails,
    record_key: &RecordKey,
    accepts_incomplete: bool,
) -> Result<ProvisionOutcome> {
    if existing.fingerprint != details.fingerprint() {
        return Err(BrokerError::InstanceAlreadyExists(
            existing.instance_id.clone(),
        ));
    }
    if existing.pending {
        return Err(busy(record_key));
    }
    match existing.state {
        InstanceState::Provisioned => Ok(ProvisionOutcome {
            state: ProvisionState::AlreadyExists,
            dashboard_url: existing.dashboard_url.clone(),
            operation: None,
        }),
        InstanceState::Provisioning if existing.operation.is_some() => {
            if !accepts_incomplete {
                return Err(BrokerError::AsyncRequired);
            }
            Ok(ProvisionOutcome {
                state: ProvisionState::Accepted,
                dashboard_url: existing.dashboard_url.clone(),
                operation: existing.operation.clone(),
            })
        }
        _ => Err(busy(record_key)),
    }
}
