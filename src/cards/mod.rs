//! # Cards Provider
//!
//! The card dealer external system and its `Deck` client.
//!
//! - `deck`: card vocabulary and deck generation
//! - `dealer`: the in-memory dealer service holding dealt decks
//! - `external`: `ExternalClient<Deck>` backed by the dealer
//! - `connector`: builds a dealer client from a Deck's `ProviderConfig`

mod connector;
mod dealer;
mod deck;
mod external;

pub use connector::{DeckConnector, ServiceFactory};
pub use dealer::{CardDealer, DealerConfig, DealtDeck};
pub use deck::{new_deck, ordered_deck, DeckType, RANKS, SUITS};
pub use external::{DealerServiceFactory, DeckExternal, CARD_COUNT_KEY, ENDPOINT_KEY};
