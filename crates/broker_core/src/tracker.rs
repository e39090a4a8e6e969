//! Async operation tracker.
//!
//! Holds at most one active operation per record. Tokens are minted here
//! (UUID v4) and stay valid until `complete` clears them; a later poll with
//! the same token is an ordinary "unknown operation" answer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BrokerError, Result};
use crate::slots::KeyedSlots;

// ── Keys and tokens ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationToken(String);

impl OperationToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OperationToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OperationToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Instance(String),
    Binding(String, String),
}

impl RecordKey {
    pub fn instance(instance_id: impl Into<String>) -> Self {
        Self::Instance(instance_id.into())
    }

    pub fn binding(instance_id: impl Into<String>, binding_id: impl Into<String>) -> Self {
        Self::Binding(instance_id.into(), binding_id.into())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(id) => write!(f, "instance {id}"),
            Self::Binding(instance_id, binding_id) => {
                write!(f, "binding {instance_id}/{binding_id}")
            }
        }
    }
}

// ── Operation state ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Provision,
    Update,
    Deprovision,
    Bind,
    Unbind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    #[serde(rename = "in progress")]
    InProgress,
    Succeeded,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedOperation {
    pub token: OperationToken,
    pub kind: OperationKind,
    /// Operation handle returned by the backing service, forwarded on polls.
    pub backend_operation: Option<String>,
    pub state: OperationState,
    pub description: Option<String>,
    pub started_at: DateTime<Utc>,
}

// ── Tracker ────────────────────────────────────────────────────

#[derive(Default)]
pub struct OperationTracker {
    active: KeyedSlots<RecordKey, Option<TrackedOperation>>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new operation. Fails with `ConcurrentAccess` if the
    /// record already has one in flight.
    pub async fn begin(
        &self,
        key: &RecordKey,
        kind: OperationKind,
        backend_operation: Option<String>,
    ) -> Result<OperationToken> {
        let mut slot = self.active.lock(key).await;
        if let Some(existing) = slot.as_ref() {
            return Err(BrokerError::ConcurrentAccess(format!(
                "{key} already has operation {} in progress",
                existing.token
            )));
        }

        let token = OperationToken::generate();
        *slot = Some(TrackedOperation {
            token: token.clone(),
            kind,
            backend_operation,
            state: OperationState::InProgress,
            description: None,
            started_at: Utc::now(),
        });
        tracing::debug!(%key, %token, ?kind, "operation started");
        Ok(token)
    }

    /// Current operation for `key`. With a token, only a matching operation
    /// is returned; `None` means the token is unknown or already completed.
    pub async fn poll(
        &self,
        key: &RecordKey,
        token: Option<&OperationToken>,
    ) -> Option<TrackedOperation> {
        let slot = self.active.lock(key).await;
        let found = slot
            .as_ref()
            .filter(|op| token.map_or(true, |t| *t == op.token))
            .cloned();
        drop(slot);
        if found.is_none() {
            self.active.release(key).await;
        }
        found
    }

    /// Record an interim description without finishing the operation.
    pub async fn annotate(
        &self,
        key: &RecordKey,
        token: &OperationToken,
        description: Option<String>,
    ) {
        let mut slot = self.active.lock(key).await;
        if let Some(op) = slot.as_mut().filter(|op| op.token == *token) {
            op.description = description;
        }
    }

    /// Finish the operation identified by `token`, freeing the record for the
    /// next one. Returns the finished operation, or `None` for a stale token.
    pub async fn complete(
        &self,
        key: &RecordKey,
        token: &OperationToken,
        state: OperationState,
        description: Option<String>,
    ) -> Option<TrackedOperation> {
        let mut slot = self.active.lock(key).await;
        let matches = slot.as_ref().map_or(false, |op| op.token == *token);
        let finished = if matches {
            slot.take().map(|mut op| {
                op.state = state;
                op.description = description;
                op
            })
        } else {
            None
        };
        drop(slot);
        self.active.release(key).await;
        if finished.is_some() {
            tracing::debug!(%key, %token, state = state.as_str(), "operation completed");
        }
        finished
    }

    /// Drop any operation tracked for `key`.
    pub async fn forget(&self, key: &RecordKey) {
        let mut slot = self.active.lock(key).await;
        *slot = None;
        drop(slot);
        self.active.release(key).await;
    }

    pub async fn active_count(&self) -> usize {
        self.active.snapshot().await.len()
    }
}
