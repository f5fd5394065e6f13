//! # Custom Resource Definitions
//!
//! CRD types for the cards provider.
//!
//! ## Module Structure
//!
//! - `common.rs` - References and policies shared by every managed resource
//! - `condition.rs` - `Ready` / `Synced` condition vocabulary
//! - `deck.rs` - The `Deck` managed resource
//! - `provider_config.rs` - `ProviderConfig` and `ProviderConfigUsage`

mod common;
mod condition;
mod deck;
mod provider_config;

pub use common::{DeletionPolicy, ProviderConfigReference, SecretReference, TypedReference};
pub use condition::{
    set_condition, Condition, ConditionStatus, ConditionType, REASON_AVAILABLE, REASON_CREATING,
    REASON_DELETING, REASON_RECONCILE_PENDING, REASON_RECONCILE_SUCCESS, REASON_UNAVAILABLE,
};
pub use deck::{Deck, DeckCard, DeckObservation, DeckParameters, DeckSpec, DeckStatus};
pub use provider_config::{
    CommonCredentialSelectors, CredentialsSource, EnvSelector, FsSelector, ProviderConfig,
    ProviderConfigSpec, ProviderConfigStatus, ProviderConfigUsage, ProviderConfigUsageSpec,
    ProviderCredentials, SecretKeySelector, PROVIDER_CONFIG_LABEL,
};
