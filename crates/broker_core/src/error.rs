use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Typed failures surfaced by the lifecycle orchestrator.
///
/// The protocol adapter is the only place these become status codes;
/// `http_status` and `error_code` describe the mapping it applies.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("plan_id not found in catalog: {0}")]
    PlanNotFound(String),

    #[error("service_id not found in catalog: {0}")]
    ServiceNotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("instance {0} already exists with a different configuration")]
    InstanceAlreadyExists(String),

    #[error("binding {instance_id}/{binding_id} already exists with a different configuration")]
    BindingAlreadyExists {
        instance_id: String,
        binding_id: String,
    },

    #[error("service plan requires client support for asynchronous operations")]
    AsyncRequired,

    #[error("service supports generation of credentials through binding an application only")]
    AppGuidRequired,

    #[error("concurrent access: {0}")]
    ConcurrentAccess(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("binding not found: {instance_id}/{binding_id}")]
    BindingNotFound {
        instance_id: String,
        binding_id: String,
    },

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BrokerError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::PlanNotFound(_)
            | Self::ServiceNotFound(_)
            | Self::Validation(_)
            | Self::InvalidParameters(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::InstanceNotFound(_) | Self::BindingNotFound { .. } => 404,
            Self::InstanceAlreadyExists(_) | Self::BindingAlreadyExists { .. } => 409,
            Self::AsyncRequired | Self::AppGuidRequired | Self::ConcurrentAccess(_) => 422,
            Self::Unsupported(_) => 501,
            Self::Internal(_) => 500,
        }
    }

    /// Protocol-level `error` code carried in the response body, if the
    /// protocol defines one for this failure.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::AsyncRequired => Some("AsyncRequired"),
            Self::AppGuidRequired => Some("RequiresApp"),
            Self::ConcurrentAccess(_) => Some("ConcurrencyError"),
            Self::InvalidParameters(_) => Some("InvalidParameters"),
            _ => None,
        }
    }

    /// Conflicts on an id already claimed by a different configuration.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::InstanceAlreadyExists(_) | Self::BindingAlreadyExists { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── http_status ──────────────────────────────────────────────

    #[test]
    fn http_status_validation_family() {
        assert_eq!(BrokerError::PlanNotFound("p".into()).http_status(), 400);
        assert_eq!(BrokerError::ServiceNotFound("s".into()).http_status(), 400);
        assert_eq!(BrokerError::Validation("x".into()).http_status(), 400);
        assert_eq!(BrokerError::InvalidParameters("x".into()).http_status(), 400);
    }

    #[test]
    fn http_status_conflicts() {
        assert_eq!(
            BrokerError::InstanceAlreadyExists("i1".into()).http_status(),
            409
        );
        let err = BrokerError::BindingAlreadyExists {
            instance_id: "i1".into(),
            binding_id: "b1".into(),
        };
        assert_eq!(err.http_status(), 409);
        assert!(err.is_conflict());
    }

    #[test]
    fn http_status_unprocessable() {
        assert_eq!(BrokerError::AsyncRequired.http_status(), 422);
        assert_eq!(BrokerError::AppGuidRequired.http_status(), 422);
        assert_eq!(
            BrokerError::ConcurrentAccess("i1".into()).http_status(),
            422
        );
    }

    #[test]
    fn http_status_not_found_and_internal() {
        assert_eq!(BrokerError::InstanceNotFound("i1".into()).http_status(), 404);
        assert_eq!(BrokerError::Unauthorized("x".into()).http_status(), 401);
        assert_eq!(BrokerError::Unsupported("x".into()).http_status(), 501);
        let err = BrokerError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_conflict());
    }

    // ── error_code ───────────────────────────────────────────────

    #[test]
    fn error_codes_follow_protocol_names() {
        assert_eq!(BrokerError::AsyncRequired.error_code(), Some("AsyncRequired"));
        assert_eq!(BrokerError::AppGuidRequired.error_code(), Some("RequiresApp"));
        assert_eq!(
            BrokerError::ConcurrentAccess("i1".into()).error_code(),
            Some("ConcurrencyError")
        );
        assert_eq!(BrokerError::PlanNotFound("p".into()).error_code(), None);
    }

    // ── Display ──────────────────────────────────────────────────

    #[test]
    fn display_plan_not_found() {
        let e = BrokerError::PlanNotFound("p2".into());
        assert_eq!(e.to_string(), "plan_id not found in catalog: p2");
    }

    #[test]
    fn display_binding_conflict() {
        let e = BrokerError::BindingAlreadyExists {
            instance_id: "i1".into(),
            binding_id: "b1".into(),
        };
        assert_eq!(
            e.to_string(),
            "binding i1/b1 already exists with a different configuration"
        );
    }

    #[test]
    fn display_internal() {
        let e = BrokerError::Internal(anyhow::anyhow!("disk on fire"));
        assert_eq!(e.to_string(), "internal: disk on fire");
    }
}
