//! # Deck External Client
//!
//! Drives the card dealer on behalf of a `Deck`. The deck's external name is
//! the key under which the dealer holds its cards.

use super::connector::ServiceFactory;
use super::dealer::{CardDealer, DealtDeck};
use super::deck::DeckType;
use crate::crd::Deck;
use crate::managed::{
    external_name, ConnectionDetails, ExternalClient, ExternalCreation, ExternalError,
    ExternalObservation, ExternalUpdate,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection detail holding the dealer address of the deck
pub const ENDPOINT_KEY: &str = "endpoint";

/// Connection detail holding the number of cards in the deck
pub const CARD_COUNT_KEY: &str = "cardCount";

fn connection_details(name: &str, dealt: &DealtDeck) -> ConnectionDetails {
    ConnectionDetails::from([
        (ENDPOINT_KEY.to_string(), format!("cards://{name}").into_bytes()),
        (
            CARD_COUNT_KEY.to_string(),
            dealt.cards.len().to_string().into_bytes(),
        ),
    ])
}

fn desired_type(mg: &Deck) -> Result<DeckType, ExternalError> {
    DeckType::from_spec(mg.spec.for_provider.deck_type.as_deref())
}

#[derive(Debug)]
pub struct DeckExternal {
    dealer: Arc<CardDealer>,
}

impl DeckExternal {
    #[must_use]
    pub fn new(dealer: Arc<CardDealer>) -> Self {
        Self { dealer }
    }
}

#[async_trait]
impl ExternalClient<Deck> for DeckExternal {
    async fn observe(&self, mg: &mut Deck) -> Result<ExternalObservation, ExternalError> {
        let name = external_name(mg);
        let Some(dealt) = self.dealer.get(&name)? else {
            debug!(external_name = %name, "deck has not been dealt");
            return Ok(ExternalObservation::default());
        };

        // An unparsable type is drift; Create and Update reject it.
        let resource_up_to_date = match desired_type(mg) {
            Ok(desired) => dealt.deck_type == desired,
            Err(e) => {
                debug!(external_name = %name, error = %e, "deck type cannot be matched");
                false
            }
        };
        let connection_details = connection_details(&name, &dealt);
        mg.set_cards(dealt.cards);
        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date,
            connection_details,
        })
    }

    async fn create(&self, mg: &mut Deck) -> Result<ExternalCreation, ExternalError> {
        let name = external_name(mg);
        let dealt = self.dealer.deal(&name, desired_type(mg)?)?;

        info!(external_name = %name, deck_type = %dealt.deck_type, cards = dealt.cards.len(), "dealt deck");
        let connection_details = connection_details(&name, &dealt);
        mg.set_cards(dealt.cards);
        Ok(ExternalCreation { connection_details })
    }

    async fn update(&self, mg: &mut Deck) -> Result<ExternalUpdate, ExternalError> {
        let name = external_name(mg);
        let dealt = self.dealer.redeal(&name, desired_type(mg)?)?;

        info!(external_name = %name, deck_type = %dealt.deck_type, "redealt deck");
        let connection_details = connection_details(&name, &dealt);
        mg.set_cards(dealt.cards);
        Ok(ExternalUpdate { connection_details })
    }

    async fn delete(&self, mg: &mut Deck) -> Result<(), ExternalError> {
        let name = external_name(mg);
        if self.dealer.discard(&name)? {
            info!(external_name = %name, "discarded deck");
        } else {
            debug!(external_name = %name, "deck already discarded");
        }
        Ok(())
    }
}

/// Builds dealer clients from `ProviderConfig` credentials.
///
/// Empty credentials are accepted for the `None` source; anything else must
/// be a JSON object.
#[derive(Debug)]
pub struct DealerServiceFactory {
    dealer: Arc<CardDealer>,
}

impl DealerServiceFactory {
    #[must_use]
    pub fn new(dealer: Arc<CardDealer>) -> Self {
        Self { dealer }
    }
}

impl ServiceFactory<Deck> for DealerServiceFactory {
    fn new_client(
        &self,
        credentials: &[u8],
    ) -> Result<Box<dyn ExternalClient<Deck>>, ExternalError> {
        if !credentials.is_empty() {
            let parsed: serde_json::Value = serde_json::from_slice(credentials).map_err(|e| {
                ExternalError::InvalidRequest(format!("credentials are not valid JSON: {e}"))
            })?;
            if !parsed.is_object() {
                return Err(ExternalError::InvalidRequest(
                    "credentials must be a JSON object".to_string(),
                ));
            }
        }
        Ok(Box::new(DeckExternal::new(Arc::clone(&self.dealer))))
    }
}
