//! # Errors
//!
//! Every failure the control loop can hit maps to a condition reason so the
//! `Synced` condition names the class of problem, not only its message.

use crate::credentials::CredentialError;
use crate::store::StoreError;
use crate::usage::TrackingError;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by an external client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl ExternalError {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ExternalError::ServiceUnavailable(_) => "ServiceUnavailable",
            ExternalError::InvalidRequest(_) => "InvalidRequest",
            ExternalError::NotAuthorized(_) => "NotAuthorized",
            ExternalError::NotFound(_) => "NotFound",
        }
    }

    /// Transient failures are expected to clear without operator action
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ExternalError::ServiceUnavailable(_))
    }
}

/// Failures producing an external client for a managed resource
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("cannot track ProviderConfig usage: {0}")]
    Tracking(#[source] TrackingError),
    #[error("cannot get ProviderConfig {name}: not found")]
    ConfigurationNotFound { name: String },
    #[error("cannot get ProviderConfig {name}: {source}")]
    ConfigurationLookup {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("cannot get credentials: {0}")]
    CredentialResolution(#[source] CredentialError),
    #[error("cannot create new Service: {0}")]
    ClientConstruction(#[source] ExternalError),
}

impl ConnectError {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ConnectError::Tracking(_) => "TrackingError",
            ConnectError::ConfigurationNotFound { .. } => "ConfigurationNotFound",
            ConnectError::ConfigurationLookup { .. } => "ConfigurationLookupError",
            ConnectError::CredentialResolution(_) => "CredentialResolutionError",
            ConnectError::ClientConstruction(_) => "ClientConstructionError",
        }
    }
}

/// Reconciliation errors
///
/// None of these stop the control loop; they decide the `Synced` condition and
/// send the resource back through the rate limited queue.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),
    #[error("cannot observe external resource: {0}")]
    Observe(#[source] ExternalError),
    #[error("cannot create external resource: {0}")]
    Create(#[source] ExternalError),
    #[error("cannot update external resource: {0}")]
    Update(#[source] ExternalError),
    #[error("cannot delete external resource: {0}")]
    Delete(#[source] ExternalError),
    #[error("cannot update managed resource: {0}")]
    Store(#[from] StoreError),
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),
    #[error("reconciliation aborted unexpectedly: {0}")]
    Aborted(String),
}

impl ReconcileError {
    /// Condition reason for the `Synced` condition
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::Connect(e) => e.reason(),
            ReconcileError::Observe(e)
            | ReconcileError::Create(e)
            | ReconcileError::Update(e)
            | ReconcileError::Delete(e) => e.reason(),
            ReconcileError::Store(e) if e.is_conflict() => "Conflict",
            ReconcileError::Store(_) => "StoreError",
            ReconcileError::Timeout(_) => "Timeout",
            ReconcileError::Aborted(_) => "Aborted",
        }
    }

    /// Step of the state machine that failed, used as a metrics label
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            ReconcileError::Connect(_) => "connect",
            ReconcileError::Observe(_) => "observe",
            ReconcileError::Create(_) => "create",
            ReconcileError::Update(_) => "update",
            ReconcileError::Delete(_) => "delete",
            ReconcileError::Store(_) => "persist",
            ReconcileError::Timeout(_) => "timeout",
            ReconcileError::Aborted(_) => "aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failures_are_distinguishable() {
        let not_found = ConnectError::ConfigurationNotFound {
            name: "default".to_string(),
        };
        let creds = ConnectError::CredentialResolution(CredentialError::KeyNotFound {
            namespace: "crossplane-system".to_string(),
            name: "dealer".to_string(),
            key: "credentials".to_string(),
        });
        let client = ConnectError::ClientConstruction(ExternalError::InvalidRequest(
            "bad bytes".to_string(),
        ));

        let reasons = [not_found.reason(), creds.reason(), client.reason()];
        assert_eq!(
            reasons,
            [
                "ConfigurationNotFound",
                "CredentialResolutionError",
                "ClientConstructionError"
            ]
        );
    }

    #[test]
    fn test_reconcile_error_uses_inner_reason() {
        let err = ReconcileError::Observe(ExternalError::ServiceUnavailable("down".to_string()));
        assert_eq!(err.reason(), "ServiceUnavailable");
        assert_eq!(err.stage(), "observe");
        assert_eq!(
            err.to_string(),
            "cannot observe external resource: service unavailable: down"
        );
    }

    #[test]
    fn test_conflict_has_its_own_reason() {
        let err = ReconcileError::Store(StoreError::Conflict {
            kind: "Deck".to_string(),
            name: "poker-night".to_string(),
        });
        assert_eq!(err.reason(), "Conflict");
        assert_eq!(err.stage(), "persist");
    }
}
