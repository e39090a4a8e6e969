//! Last-operation polling and finalization of asynchronous work.
//!
//! The backend is polled without any lock held. A terminal answer is then
//! applied under the record lock, and the tracker is completed in the same
//! critical section so two concurrent polls cannot both finalize.

use crate::capability::{BackingError, LastOperation};
use crate::error::Result;
use crate::outcome::{LastOperationOutcome, LastOperationStatus};
use crate::records::{BindingState, InstanceState, RecordStore};
use crate::tracker::{OperationKind, OperationState, OperationToken, RecordKey, TrackedOperation};

use super::{lift, LifecycleOrchestrator};

impl LifecycleOrchestrator {
    pub async fn last_operation(
        &self,
        instance_id: &str,
        token: Option<&str>,
    ) -> Result<LastOperationOutcome> {
        let key = instance_id.to_string();
        let record_key = RecordKey::instance(instance_id);

        let service_id = {
            let slot = self.records.instances.lock(&key).await;
            match slot.as_ref() {
                Some(record) => record.service_id.clone(),
                None => {
                    drop(slot);
                    self.records.instances.release(&key).await;
                    return Ok(LastOperationOutcome::Gone);
                }
            }
        };

        let token = token.map(OperationToken::from);
        let Some(op) = self.tracker.poll(&record_key, token.as_ref()).await else {
            return Ok(LastOperationOutcome::UnknownOperation);
        };

        let backend = self.registry.backend_for(&service_id)?;
        let polled = match backend
            .last_operation(instance_id, op.backend_operation.as_deref())
            .await
        {
            Ok(polled) => polled,
            Err(BackingError::InstanceNotFound) if op.kind == OperationKind::Deprovision => {
                self.finish_instance(&key, &record_key, &op, OperationState::Succeeded, None)
                    .await;
                return Ok(LastOperationOutcome::Gone);
            }
            Err(e) => return Err(lift(e, &record_key)),
        };

        if !polled.state.is_terminal() {
            self.tracker
                .annotate(&record_key, &op.token, polled.description.clone())
                .await;
            return Ok(status(polled));
        }

        self.finish_instance(
            &key,
            &record_key,
            &op,
            polled.state,
            polled.description.clone(),
        )
        .await;
        Ok(status(polled))
    }

    pub async fn last_binding_operation(
        &self,
        instance_id: &str,
        binding_id: &str,
        token: Option<&str>,
    ) -> Result<LastOperationOutcome> {
        let key = RecordStore::binding_key(instance_id, binding_id);
        let record_key = RecordKey::binding(instance_id, binding_id);

        let service_id = {
            let slot = self.records.bindings.lock(&key).await;
            match slot.as_ref() {
                Some(record) => record.service_id.clone(),
                None => {
                    drop(slot);
                    self.records.bindings.release(&key).await;
                    return Ok(LastOperationOutcome::Gone);
                }
            }
        };

        let token = token.map(OperationToken::from);
        let Some(op) = self.tracker.poll(&record_key, token.as_ref()).await else {
            return Ok(LastOperationOutcome::UnknownOperation);
        };

        let backend = self.registry.backend_for(&service_id)?;
        let polled = match backend
            .last_binding_operation(instance_id, binding_id, op.backend_operation.as_deref())
            .await
        {
            Ok(polled) => polled,
            Err(BackingError::BindingNotFound) if op.kind == OperationKind::Unbind => {
                self.finish_binding(&key, &record_key, &op, OperationState::Succeeded, None)
                    .await;
                return Ok(LastOperationOutcome::Gone);
            }
            Err(e) => return Err(lift(e, &record_key)),
        };

        if !polled.state.is_terminal() {
            self.tracker
                .annotate(&record_key, &op.token, polled.description.clone())
                .await;
            return Ok(status(polled));
        }

        self.finish_binding(
            &key,
            &record_key,
            &op,
            polled.state,
            polled.description.clone(),
        )
        .await;
        Ok(status(polled))
    }

    async fn finish_instance(
        &self,
        key: &String,
        record_key: &RecordKey,
        op: &TrackedOperation,
        state: OperationState,
        description: Option<String>,
    ) {
        let mut slot = self.records.instances.lock(key).await;
        let finished = self
            .tracker
            .complete(record_key, &op.token, state, description)
            .await;
        if finished.is_none() {
            // Another poll already applied this result.
            return;
        }
        let Some(record) = slot.as_mut() else {
            return;
        };

        let succeeded = state == OperationState::Succeeded;
        match (op.kind, succeeded) {
            (OperationKind::Provision, true) => record.settle(InstanceState::Provisioned),
            (OperationKind::Provision, false) => record.settle(InstanceState::Failed),
            (OperationKind::Update, true) => {
                record.apply_staged();
                record.settle(InstanceState::Provisioned);
            }
            (OperationKind::Deprovision, true) => {
                self.clear_instance(key, slot).await;
                tracing::info!(%record_key, "asynchronous deprovision finished");
                return;
            }
            (OperationKind::Update | OperationKind::Deprovision, false) => record.abort(),
            _ => {
                tracing::warn!(
                    %record_key,
                    kind = ?op.kind,
                    "binding operation tracked on instance"
                );
                return;
            }
        }
        tracing::info!(
            %record_key,
            kind = ?op.kind,
            state = state.as_str(),
            "asynchronous operation finished"
        );
    }

    async fn finish_binding(
        &self,
        key: &(String, String),
        record_key: &RecordKey,
        op: &TrackedOperation,
        state: OperationState,
        description: Option<String>,
    ) {
        let mut slot = self.records.bindings.lock(key).await;
        let finished = self
            .tracker
            .complete(record_key, &op.token, state, description)
            .await;
        if finished.is_none() {
            return;
        }
        let Some(record) = slot.as_mut() else {
            return;
        };

        let succeeded = state == OperationState::Succeeded;
        match (op.kind, succeeded) {
            (OperationKind::Bind, true) => record.settle(BindingState::Bound),
            (OperationKind::Bind, false) => record.settle(BindingState::Failed),
            (OperationKind::Unbind, true) => {
                self.clear_binding(key, slot).await;
                tracing::info!(%record_key, "asynchronous unbind finished");
                return;
            }
            (OperationKind::Unbind, false) => record.abort(),
            _ => {
                tracing::warn!(
                    %record_key,
                    kind = ?op.kind,
                    "instance operation tracked on binding"
                );
                return;
            }
        }
        tracing::info!(
            %record_key,
            kind = ?op.kind,
            state = state.as_str(),
            "asynchronous operation finished"
        );
    }
}

fn status(polled: LastOperation) -> LastOperationOutcome {
    LastOperationOutcome::Status(LastOperationStatus {
        state: polled.state,
        description: polled.description,
    })
}
