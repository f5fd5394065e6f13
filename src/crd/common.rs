//! # Common Resource Types
//!
//! Reference and policy types embedded in managed resource specs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the `ProviderConfig` a managed resource authenticates with
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigReference {
    /// Name of the referenced `ProviderConfig`
    #[serde(default = "default_provider_config_name")]
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: default_provider_config_name(),
        }
    }
}

fn default_provider_config_name() -> String {
    "default".to_string()
}

/// What happens to the external resource when the managed resource is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum DeletionPolicy {
    /// Delete the external resource
    #[default]
    Delete,
    /// Leave the external resource in place
    Orphan,
}

/// Namespaced reference to a Kubernetes `Secret`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

/// Reference to an object of a known kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}
