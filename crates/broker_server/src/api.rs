//! Wire shapes for query strings and response bodies.
//!
//! Request bodies deserialize straight into the `broker_core::details`
//! types; only what the protocol adds on top lives here.

use broker_core::capability::BindingMaterial;
use broker_core::details::Parameters;
use broker_core::outcome::{
    BindOutcome, BindingSnapshot, InstanceSnapshot, LastOperationStatus, ProvisionOutcome,
    UpdateOutcome,
};
use broker_core::tracker::{OperationState, OperationToken};
use serde::{Deserialize, Deserializer, Serialize};

// ── Query strings ──────────────────────────────────────────────

/// Only the literal `true` opts in to asynchronous completion.
fn literal_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw == "true")
}

#[derive(Debug, Default, Deserialize)]
pub struct AcceptsIncomplete {
    #[serde(default, deserialize_with = "literal_true")]
    pub accepts_incomplete: bool,
}

/// Query for DELETE on instances and bindings.
#[derive(Debug, Default, Deserialize)]
pub struct RemovalQuery {
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    #[serde(default, deserialize_with = "literal_true")]
    pub accepts_incomplete: bool,
}

impl RemovalQuery {
    /// Both ids are mandatory on removal requests.
    pub fn ids(&self) -> Option<(&str, &str)> {
        Some((self.service_id.as_deref()?, self.plan_id.as_deref()?))
    }
}

/// The platform may also send `service_id` and `plan_id`. They are ignored:
/// the stored record already names the backend to poll.
#[derive(Debug, Default, Deserialize)]
pub struct LastOperationQuery {
    pub operation: Option<String>,
}

// ── Responses ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ProvisionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationToken>,
}

impl From<ProvisionOutcome> for ProvisionResponse {
    fn from(outcome: ProvisionOutcome) -> Self {
        Self {
            dashboard_url: outcome.dashboard_url,
            operation: outcome.operation,
        }
    }
}

impl From<UpdateOutcome> for ProvisionResponse {
    fn from(outcome: UpdateOutcome) -> Self {
        Self {
            dashboard_url: outcome.dashboard_url,
            operation: outcome.operation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    #[serde(flatten)]
    pub material: BindingMaterial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationToken>,
}

impl From<BindOutcome> for BindResponse {
    fn from(outcome: BindOutcome) -> Self {
        Self {
            material: outcome.material,
            operation: outcome.operation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InstanceResponse {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl From<InstanceSnapshot> for InstanceResponse {
    fn from(snapshot: InstanceSnapshot) -> Self {
        Self {
            service_id: snapshot.service_id,
            plan_id: snapshot.plan_id,
            dashboard_url: snapshot.dashboard_url,
            parameters: snapshot.parameters,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BindingResponse {
    #[serde(flatten)]
    pub material: BindingMaterial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

impl From<BindingSnapshot> for BindingResponse {
    fn from(snapshot: BindingSnapshot) -> Self {
        Self {
            material: snapshot.material,
            parameters: snapshot.parameters,
        }
    }
}

/// Body of an accepted asynchronous removal, or `{}` for a finished one.
#[derive(Debug, Default, Serialize)]
pub struct RemovalResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationToken>,
}

#[derive(Debug, Serialize)]
pub struct LastOperationResponse {
    pub state: OperationState,
    pub description: String,
}

impl LastOperationResponse {
    /// Answer for a record that no longer exists or an operation that has
    /// already been reported as finished.
    pub fn gone() -> Self {
        Self {
            state: OperationState::Succeeded,
            description: String::new(),
        }
    }
}

impl From<LastOperationStatus> for LastOperationResponse {
    fn from(status: LastOperationStatus) -> Self {
        Self {
            state: status.state,
            description: status.description.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn accepts(query: &str) -> bool {
        let uri: axum::http::Uri = format!("/x?{query}").parse().unwrap();
        axum::extract::Query::<AcceptsIncomplete>::try_from_uri(&uri)
            .unwrap()
            .0
            .accepts_incomplete
    }

    #[test]
    fn only_literal_true_accepts_incomplete() {
        assert!(accepts("accepts_incomplete=true"));
        assert!(!accepts("accepts_incomplete=True"));
        assert!(!accepts("accepts_incomplete=1"));
        assert!(!accepts(""));
    }

    #[test]
    fn last_operation_query_tolerates_routing_hints() {
        let uri: axum::http::Uri = "/x?operation=op-1&service_id=s1&plan_id=p1"
            .parse()
            .unwrap();
        let query = axum::extract::Query::<LastOperationQuery>::try_from_uri(&uri)
            .unwrap()
            .0;
        assert_eq!(query.operation.as_deref(), Some("op-1"));
    }

    #[test]
    fn removal_requires_both_ids() {
        let query = RemovalQuery {
            service_id: Some("s1".into()),
            ..Default::default()
        };
        assert_eq!(query.ids(), None);
        let query = RemovalQuery {
            service_id: Some("s1".into()),
            plan_id: Some("p1".into()),
            accepts_incomplete: false,
        };
        assert_eq!(query.ids(), Some(("s1", "p1")));
    }

    #[test]
    fn last_operation_body_always_has_description() {
        let body = serde_json::to_value(LastOperationResponse::gone()).unwrap();
        assert_eq!(body, json!({ "state": "succeeded", "description": "" }));

        let status = LastOperationStatus {
            state: OperationState::InProgress,
            description: Some("copying".into()),
        };
        let body = serde_json::to_value(LastOperationResponse::from(status)).unwrap();
        assert_eq!(body, json!({ "state": "in progress", "description": "copying" }));
    }

    #[test]
    fn empty_removal_body_is_empty_object() {
        let body = serde_json::to_value(RemovalResponse::default()).unwrap();
        assert_eq!(body, json!({}));
    }
}
