//! # Initializers
//!
//! Metadata a managed resource needs before it is first created externally.
//! Initializers only mutate the in-memory object; the reconciler persists all
//! of their changes in a single metadata write.

use super::{ManagedResource, EXTERNAL_NAME_ANNOTATION};
use kube::ResourceExt;

pub trait Initializer<K>: Send + Sync {
    /// Returns true if the object was changed
    fn initialize(&self, mg: &mut K) -> bool;
}

/// Uses the object name as the external name when none is set
#[derive(Debug, Clone, Copy, Default)]
pub struct NameAsExternalName;

impl<K: ManagedResource> Initializer<K> for NameAsExternalName {
    fn initialize(&self, mg: &mut K) -> bool {
        if mg
            .annotations()
            .get(EXTERNAL_NAME_ANNOTATION)
            .is_some_and(|name| !name.is_empty())
        {
            return false;
        }
        let name = mg.name_any();
        mg.annotations_mut()
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), name);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Deck, DeckParameters, DeckSpec, DeletionPolicy, ProviderConfigReference};

    fn deck() -> Deck {
        Deck::new(
            "poker-night",
            DeckSpec {
                for_provider: DeckParameters::default(),
                provider_config_ref: ProviderConfigReference::default(),
                deletion_policy: DeletionPolicy::Delete,
                write_connection_secret_to_ref: None,
            },
        )
    }

    #[test]
    fn test_sets_external_name_once() {
        let mut mg = deck();
        assert!(NameAsExternalName.initialize(&mut mg));
        assert_eq!(
            mg.annotations().get(EXTERNAL_NAME_ANNOTATION).map(String::as_str),
            Some("poker-night")
        );
        assert!(!NameAsExternalName.initialize(&mut mg));
    }

    #[test]
    fn test_keeps_existing_external_name() {
        let mut mg = deck();
        mg.annotations_mut()
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), "table-7".to_string());
        assert!(!NameAsExternalName.initialize(&mut mg));
        assert_eq!(
            mg.annotations().get(EXTERNAL_NAME_ANNOTATION).map(String::as_str),
            Some("table-7")
        );
    }
}
