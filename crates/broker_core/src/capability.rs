//! Backing service capability: the port a concrete broker implements.
//!
//! The orchestrator validates requests and owns all idempotency and
//! concurrency decisions; implementations only perform the real work and
//! report how it went. Held as `Arc<dyn BackingService>` so the same
//! lifecycle logic drives real backends and test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::catalog::Service;
use crate::details::{
    BindDetails, DeprovisionDetails, ProvisionDetails, UnbindDetails, UpdateDetails,
};
use crate::tracker::OperationState;

// ── Results ────────────────────────────────────────────────────

/// Whether the backend finished the work inline or will finish it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Sync,
    /// The work continues in the background. `operation` is the backend's
    /// own handle, passed back on every status poll.
    Async { operation: Option<String> },
}

impl Completion {
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async { .. })
    }

    pub fn backend_operation(&self) -> Option<String> {
        match self {
            Self::Async { operation } => operation.clone(),
            Self::Sync => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedSpec {
    pub completion: Completion,
    pub dashboard_url: Option<String>,
}

impl ProvisionedSpec {
    pub fn sync() -> Self {
        Self {
            completion: Completion::Sync,
            dashboard_url: None,
        }
    }

    pub fn deferred(operation: Option<String>) -> Self {
        Self {
            completion: Completion::Async { operation },
            dashboard_url: None,
        }
    }

    pub fn with_dashboard_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedSpec {
    pub completion: Completion,
    pub dashboard_url: Option<String>,
}

impl UpdatedSpec {
    pub fn sync() -> Self {
        Self {
            completion: Completion::Sync,
            dashboard_url: None,
        }
    }

    pub fn deferred(operation: Option<String>) -> Self {
        Self {
            completion: Completion::Async { operation },
            dashboard_url: None,
        }
    }
}

/// Credentials and attachments produced by a bind. Opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingMaterial {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog_drain_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindingSpec {
    pub completion: Completion,
    pub material: BindingMaterial,
}

impl BindingSpec {
    pub fn sync(material: BindingMaterial) -> Self {
        Self {
            completion: Completion::Sync,
            material,
        }
    }

    pub fn deferred(operation: Option<String>) -> Self {
        Self {
            completion: Completion::Async { operation },
            material: BindingMaterial::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovalSpec {
    pub completion: Completion,
}

impl RemovalSpec {
    pub fn sync() -> Self {
        Self {
            completion: Completion::Sync,
        }
    }

    pub fn deferred(operation: Option<String>) -> Self {
        Self {
            completion: Completion::Async { operation },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastOperation {
    pub state: OperationState,
    pub description: Option<String>,
}

impl LastOperation {
    pub fn new(state: OperationState, description: Option<String>) -> Self {
        Self { state, description }
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Typed failures a backing service may report.
#[derive(Debug, Error)]
pub enum BackingError {
    #[error("asynchronous operation required")]
    AsyncRequired,

    #[error("binding requires an application reference")]
    AppGuidRequired,

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("instance does not exist on the backend")]
    InstanceNotFound,

    #[error("binding does not exist on the backend")]
    BindingNotFound,

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type BackingResult<T> = std::result::Result<T, BackingError>;

// ── BackingService trait ───────────────────────────────────────

#[async_trait]
pub trait BackingService: Send + Sync {
    /// Services (and their plans) this backend fulfils.
    fn services(&self) -> Vec<Service>;

    async fn provision(
        &self,
        instance_id: &str,
        details: &ProvisionDetails,
        accepts_incomplete: bool,
    ) -> BackingResult<ProvisionedSpec>;

    async fn update(
        &self,
        instance_id: &str,
        details: &UpdateDetails,
        accepts_incomplete: bool,
    ) -> BackingResult<UpdatedSpec>;

    async fn deprovision(
        &self,
        instance_id: &str,
        details: &DeprovisionDetails,
        accepts_incomplete: bool,
    ) -> BackingResult<RemovalSpec>;

    async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: &BindDetails,
        accepts_incomplete: bool,
    ) -> BackingResult<BindingSpec>;

    async fn unbind(
        &self,
        instance_id: &str,
        binding_id: &str,
        details: &UnbindDetails,
        accepts_incomplete: bool,
    ) -> BackingResult<RemovalSpec>;

    /// Status of an asynchronous instance operation.
    async fn last_operation(
        &self,
        instance_id: &str,
        operation: Option<&str>,
    ) -> BackingResult<LastOperation>;

    /// Status of an asynchronous binding operation.
    async fn last_binding_operation(
        &self,
        _instance_id: &str,
        _binding_id: &str,
        _operation: Option<&str>,
    ) -> BackingResult<LastOperation> {
        Err(BackingError::Unsupported(
            "asynchronous binding operations".into(),
        ))
    }

    /// Fetch material for a binding created asynchronously.
    async fn get_binding(
        &self,
        _instance_id: &str,
        _binding_id: &str,
    ) -> BackingResult<BindingMaterial> {
        Err(BackingError::Unsupported("binding retrieval".into()))
    }
}
