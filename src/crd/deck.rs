//! # Deck
//!
//! The `Deck` managed resource. A deck is dealt by the card dealer service and
//! its cards are reported back under `status.atProvider`.

use super::common::{DeletionPolicy, ProviderConfigReference, SecretReference};
use super::condition::{set_condition, Condition};
use crate::managed::ManagedResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Deck Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: deck.cards.crossplane.io/v1alpha1
/// kind: Deck
/// metadata:
///   name: poker-night
/// spec:
///   forProvider:
///     type: Shuffled
///   providerConfigRef:
///     name: default
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "deck.cards.crossplane.io",
    version = "v1alpha1",
    kind = "Deck",
    status = "DeckStatus",
    category = "crossplane",
    category = "managed",
    printcolumn = r#"{"name":"READY", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"SYNCED", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#,
    printcolumn = r#"{"name":"AGE", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeckSpec {
    /// Desired deck parameters
    pub for_provider: DeckParameters,
    /// ProviderConfig holding the dealer credentials
    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,
    /// Whether deleting the Deck also discards the dealt deck
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Where connection details would be published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

/// Configurable fields of a Deck
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeckParameters {
    /// Decks can be dealt Shuffled, Ordered, or Empty.
    /// Empty decks are useful as discard piles.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub deck_type: Option<String>,
}

/// A single playing card
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema)]
pub struct DeckCard {
    pub suit: String,
    pub rank: String,
}

/// Observed state of the dealt deck
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeckObservation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<DeckCard>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeckStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub at_provider: DeckObservation,
}

impl ManagedResource for Deck {
    fn provider_config_reference(&self) -> &ProviderConfigReference {
        &self.spec.provider_config_ref
    }

    fn deletion_policy(&self) -> DeletionPolicy {
        self.spec.deletion_policy
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.conditions.as_slice())
    }

    fn set_condition(&mut self, condition: Condition) {
        let status = self.status.get_or_insert_with(DeckStatus::default);
        set_condition(&mut status.conditions, condition);
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status.clone_from(&other.status);
    }
}

impl Deck {
    /// Cards last reported by the dealer
    #[must_use]
    pub fn cards(&self) -> &[DeckCard] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.at_provider.cards.as_slice())
    }

    pub(crate) fn set_cards(&mut self, cards: Vec<DeckCard>) {
        self.status
            .get_or_insert_with(DeckStatus::default)
            .at_provider
            .cards = cards;
    }
}
