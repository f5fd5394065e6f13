//! # Conditions
//!
//! The `Ready` and `Synced` conditions are the only operator-facing record of
//! what the control loop last did to a resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_UNAVAILABLE: &str = "Unavailable";
pub const REASON_CREATING: &str = "Creating";
pub const REASON_DELETING: &str = "Deleting";
pub const REASON_RECONCILE_PENDING: &str = "ReconcilePending";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";

/// Condition kinds surfaced on every managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    /// Whether the external resource is usable
    Ready,
    /// Whether the last reconciliation succeeded
    Synced,
}

impl ConditionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::Synced => "Synced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// Condition represents a status condition for the resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (Ready, Synced)
    pub r#type: String,
    /// Status of condition (True, False, Unknown)
    pub status: String,
    /// Last time the status value changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: Option<String>,
    ) -> Self {
        Self {
            r#type: condition_type.as_str().to_string(),
            status: status.as_str().to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message,
        }
    }

    /// The external resource exists and matches the spec.
    #[must_use]
    pub fn available() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::True,
            REASON_AVAILABLE,
            None,
        )
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            REASON_UNAVAILABLE,
            Some(message.into()),
        )
    }

    #[must_use]
    pub fn creating() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            REASON_CREATING,
            None,
        )
    }

    #[must_use]
    pub fn deleting() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            REASON_DELETING,
            None,
        )
    }

    /// Readiness is not known yet because no observation has succeeded.
    #[must_use]
    pub fn pending() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::Unknown,
            REASON_RECONCILE_PENDING,
            None,
        )
    }

    #[must_use]
    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            REASON_RECONCILE_SUCCESS,
            None,
        )
    }

    /// `reason` carries the error class, `message` the rendered error chain.
    #[must_use]
    pub fn reconcile_error(reason: &str, message: impl Into<String>) -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::False,
            reason,
            Some(message.into()),
        )
    }

    #[must_use]
    pub fn is_type(&self, condition_type: ConditionType) -> bool {
        self.r#type == condition_type.as_str()
    }

    #[must_use]
    pub fn is_status(&self, status: ConditionStatus) -> bool {
        self.status == status.as_str()
    }

    /// Equal apart from the transition timestamp
    fn same_as(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Insert or replace a condition of the same type.
///
/// The transition time is carried over from the existing condition unless the
/// status value changes.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if existing.same_as(&condition) {
                return;
            }
            if existing.status == condition.status {
                condition
                    .last_transition_time
                    .clone_from(&existing.last_transition_time);
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}
