//! In-memory `BackingService` double for tests.
//!
//! Every operation answers with a canned result (configurable per
//! operation), counts its invocations, and can be slowed down to widen
//! race windows. Enabled under `cfg(test)` or the `testing` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::capability::{
    BackingError, BackingResult, BackingService, BindingMaterial, BindingSpec, LastOperation,
    ProvisionedSpec, RemovalSpec, UpdatedSpec,
};
use crate::catalog::{Service, ServicePlan};
use crate::details::{
    BindDetails, DeprovisionDetails, ProvisionDetails, UnbindDetails, UpdateDetails,
};
use crate::tracker::OperationState;

/// Cloneable stand-in for `BackingError`, so canned answers can be replayed.
#[derive(Debug, Clone)]
pub enum FakeFailure {
    AsyncRequired,
    AppGuidRequired,
    InvalidParameters(String),
    InstanceNotFound,
    BindingNotFound,
    Unsupported(String),
    Internal(String),
}

impl From<FakeFailure> for BackingError {
    fn from(failure: FakeFailure) -> Self {
        match failure {
            FakeFailure::AsyncRequired => Self::AsyncRequired,
            FakeFailure::AppGuidRequired => Self::AppGuidRequired,
            FakeFailure::InvalidParameters(msg) => Self::InvalidParameters(msg),
            FakeFailure::InstanceNotFound => Self::InstanceNotFound,
            FakeFailure::BindingNotFound => Self::BindingNotFound,
            FakeFailure::Unsupported(what) => Self::Unsupported(what),
            FakeFailure::Internal(msg) => Self::Internal(anyhow::anyhow!(msg)),
        }
    }
}

pub type Canned<T> = std::result::Result<T, FakeFailure>;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn answer<T: Clone>(canned: &Mutex<Canned<T>>) -> BackingResult<T> {
    guard(canned).clone().map_err(BackingError::from)
}

/// Service `s1` with plans `p1` and `p2` (bindable) and `p3` (not bindable).
pub fn sample_service() -> Service {
    Service::new(
        "s1",
        "fake-service",
        "in-memory test service",
        true,
        vec![
            ServicePlan::new("p1", "small", "small plan"),
            ServicePlan::new("p2", "large", "large plan"),
            ServicePlan::new("p3", "unbindable", "plan without bindings").with_bindable(false),
        ],
    )
    .with_plan_updateable(true)
}

pub fn sample_material() -> BindingMaterial {
    let mut credentials = Map::new();
    credentials.insert("username".into(), json!("fake-user"));
    credentials.insert("password".into(), json!("fake-pass"));
    BindingMaterial {
        credentials: Some(credentials),
        ..Default::default()
    }
}

pub struct FakeBackingService {
    services: Vec<Service>,
    latency: Option<Duration>,
    provision: Mutex<Canned<ProvisionedSpec>>,
    update: Mutex<Canned<UpdatedSpec>>,
    deprovision: Mutex<Canned<RemovalSpec>>,
    bind: Mutex<Canned<BindingSpec>>,
    unbind: Mutex<Canned<RemovalSpec>>,
    fetch_binding: Mutex<Canned<BindingMaterial>>,
    last_operations: Mutex<VecDeque<Canned<LastOperation>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    backend_operations: Mutex<Vec<Option<String>>>,
    last_provision: Mutex<Option<ProvisionDetails>>,
    last_bind: Mutex<Option<BindDetails>>,
}

impl FakeBackingService {
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services,
            latency: None,
            provision: Mutex::new(Ok(ProvisionedSpec::sync())),
            update: Mutex::new(Ok(UpdatedSpec::sync())),
            deprovision: Mutex::new(Ok(RemovalSpec::sync())),
            bind: Mutex::new(Ok(BindingSpec::sync(sample_material()))),
            unbind: Mutex::new(Ok(RemovalSpec::sync())),
            fetch_binding: Mutex::new(Ok(sample_material())),
            last_operations: Mutex::new(VecDeque::new()),
            calls: Mutex::new(HashMap::new()),
            backend_operations: Mutex::new(Vec::new()),
            last_provision: Mutex::new(None),
            last_bind: Mutex::new(None),
        }
    }

    /// A fake offering [`sample_service`].
    pub fn sample() -> Self {
        Self::new(vec![sample_service()])
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn on_provision(&self, canned: Canned<ProvisionedSpec>) {
        *guard(&self.provision) = canned;
    }

    pub fn on_update(&self, canned: Canned<UpdatedSpec>) {
        *guard(&self.update) = canned;
    }

    pub fn on_deprovision(&self, canned: Canned<RemovalSpec>) {
        *guard(&self.deprovision) = canned;
    }

    pub fn on_bind(&self, canned: Canned<BindingSpec>) {
        *guard(&self.bind) = canned;
    }

    pub fn on_unbind(&self, canned: Canned<RemovalSpec>) {
        *guard(&self.unbind) = canned;
    }

    pub fn on_get_binding(&self, canned: Canned<BindingMaterial>) {
        *guard(&self.fetch_binding) = canned;
    }

    /// Queue an answer for the next status poll. With nothing queued, polls
    /// report success.
    pub fn push_last_operation(&self, canned: Canned<LastOperation>) {
        guard(&self.last_operations).push_back(canned);
    }

    pub fn push_state(&self, state: OperationState, description: Option<&str>) {
        self.push_last_operation(Ok(LastOperation::new(
            state,
            description.map(str::to_string),
        )));
    }

    pub fn calls(&self, operation: &str) -> usize {
        guard(&self.calls).get(operation).copied().unwrap_or(0)
    }

    /// Backend operation handles passed to status polls, in order.
    pub fn polled_operations(&self) -> Vec<Option<String>> {
        guard(&self.backend_operations).clone()
    }

    pub fn last_provision(&self) -> Option<ProvisionDetails> {
        guard(&self.last_provision).clone()
    }

    pub fn last_bind(&self) -> Option<BindDetails> {
        guard(&self.last_bind).clone()
    }

    async fn enter(&self, operation: &'static str) {
        *guard(&self.calls).entry(operation).or_insert(0) += 1;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn next_status(&self, operation: Option<&str>) -> BackingResult<LastOperation> {
        guard(&self.backend_operations).push(operation.map(str::to_string));
        guard(&self.last_operations)
            .pop_front()
            .unwrap_or_else(|| Ok(LastOperation::new(OperationState::Succeeded, None)))
            .map_err(BackingError::from)
    }
}

#[async_trait]
impl BackingService for FakeBackingService {
    fn services(&self) -> Vec<Service> {
        self.services.clone()
    }

    async fn provision(
        &self,
        _instance_id: &str,
        details: &ProvisionDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<ProvisionedSpec> {
        self.enter("provision").await;
        *guard(&self.last_provision) = Some(details.clone());
        answer(&self.provision)
    }

    async fn update(
        &self,
        _instance_id: &str,
        _details: &UpdateDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<UpdatedSpec> {
        self.enter("update").await;
        answer(&self.update)
    }

    async fn deprovision(
        &self,
        _instance_id: &str,
        _details: &DeprovisionDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<RemovalSpec> {
        self.enter("deprovision").await;
        answer(&self.deprovision)
    }

    async fn bind(
        &self,
        _instance_id: &str,
        _binding_id: &str,
        details: &BindDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<BindingSpec> {
        self.enter("bind").await;
        *guard(&self.last_bind) = Some(details.clone());
        answer(&self.bind)
    }

    async fn unbind(
        &self,
        _instance_id: &str,
        _binding_id: &str,
        _details: &UnbindDetails,
        _accepts_incomplete: bool,
    ) -> BackingResult<RemovalSpec> {
        self.enter("unbind").await;
        answer(&self.unbind)
    }

    async fn last_operation(
        &self,
        _instance_id: &str,
        operation: Option<&str>,
    ) -> BackingResult<LastOperation> {
        self.enter("last_operation").await;
        self.next_status(operation)
    }

    async fn last_binding_operation(
        &self,
        _instance_id: &str,
        _binding_id: &str,
        operation: Option<&str>,
    ) -> BackingResult<LastOperation> {
        self.enter("last_binding_operation").await;
        self.next_status(operation)
    }

    async fn get_binding(
        &self,
        _instance_id: &str,
        _binding_id: &str,
    ) -> BackingResult<BindingMaterial> {
        self.enter("get_binding").await;
        answer(&self.fetch_binding)
    }
}

/// Parameters map from a JSON object literal.
pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    }
}
