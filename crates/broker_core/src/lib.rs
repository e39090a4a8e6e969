//! broker_core: lifecycle core of a platform service broker.
//!
//! Owns the instance/binding state machine: deciding whether a request is a
//! fresh creation, an idempotent replay, a conflict, or an asynchronous
//! operation that the platform will poll. The concrete provisioning work is
//! delegated to [`capability::BackingService`] implementations; the HTTP
//! surface lives in `broker_server`.

pub mod capability;
pub mod catalog;
pub mod details;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod outcome;
pub mod records;
pub mod registry;
pub mod slots;
pub mod tracker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{BrokerError, Result};
pub use lifecycle::LifecycleOrchestrator;
pub use registry::BrokerRegistry;
