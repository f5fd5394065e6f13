//! # Provider Configuration
//!
//! `ProviderConfig` tells the provider where to find dealer credentials.
//! `ProviderConfigUsage` records which managed resources depend on a config so
//! it cannot be removed while in use.

use super::common::{ProviderConfigReference, TypedReference};
use super::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label set on every usage naming the config it points at
pub const PROVIDER_CONFIG_LABEL: &str = "cards.crossplane.io/provider-config";

/// ProviderConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: cards.crossplane.io/v1alpha1
/// kind: ProviderConfig
/// metadata:
///   name: default
/// spec:
///   credentials:
///     source: Secret
///     secretRef:
///       namespace: crossplane-system
///       name: dealer-creds
///       key: credentials
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cards.crossplane.io",
    version = "v1alpha1",
    kind = "ProviderConfig",
    status = "ProviderConfigStatus",
    category = "crossplane",
    category = "provider",
    printcolumn = r#"{"name":"SOURCE", "type":"string", "jsonPath":".spec.credentials.source"}"#,
    printcolumn = r#"{"name":"AGE", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Credentials used to connect to the dealer
    pub credentials: ProviderCredentials,
}

/// Credentials descriptor: a source kind plus the selector for that source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    pub source: CredentialsSource,
    #[serde(flatten)]
    pub selectors: CommonCredentialSelectors,
}

/// Where credentials are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum CredentialsSource {
    /// No credentials are required
    None,
    /// A key of a Kubernetes Secret
    Secret,
    /// An environment variable of the provider process
    Environment,
    /// A file on the provider's filesystem
    Filesystem,
}

impl CredentialsSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialsSource::None => "None",
            CredentialsSource::Secret => "Secret",
            CredentialsSource::Environment => "Environment",
            CredentialsSource::Filesystem => "Filesystem",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommonCredentialSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EnvSelector {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct FsSelector {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Number of managed resources using this config
    #[serde(default)]
    pub users: Option<i64>,
}

/// ProviderConfigUsage Custom Resource Definition
///
/// Created by the usage tracker; owned by the managed resource it names so it
/// is garbage collected with it.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cards.crossplane.io",
    version = "v1alpha1",
    kind = "ProviderConfigUsage",
    category = "crossplane",
    category = "provider",
    printcolumn = r#"{"name":"CONFIG-NAME", "type":"string", "jsonPath":".spec.providerConfigRef.name"}"#,
    printcolumn = r#"{"name":"RESOURCE-KIND", "type":"string", "jsonPath":".spec.resourceRef.kind"}"#,
    printcolumn = r#"{"name":"RESOURCE-NAME", "type":"string", "jsonPath":".spec.resourceRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigUsageSpec {
    pub provider_config_ref: ProviderConfigReference,
    pub resource_ref: TypedReference,
}
