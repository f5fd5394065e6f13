//! # Card Dealer
//!
//! The mock external system. It keeps dealt decks keyed by external name and
//! deals new ones from an explicitly seeded random number generator.

use super::deck::{new_deck, DeckType};
use crate::crd::DeckCard;
use crate::managed::ExternalError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Dealer settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DealerConfig {
    /// Seed for shuffling. Unset seeds from OS entropy.
    pub seed: Option<u64>,
}

/// A deck held by the dealer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealtDeck {
    pub deck_type: DeckType,
    pub cards: Vec<DeckCard>,
}

#[derive(Debug)]
pub struct CardDealer {
    decks: Mutex<HashMap<String, DealtDeck>>,
    rng: Mutex<StdRng>,
    available: AtomicBool,
}

impl CardDealer {
    #[must_use]
    pub fn new(config: DealerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            decks: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage; every call fails with `ServiceUnavailable` until
    /// the dealer is made available again.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn decks(&self) -> Result<MutexGuard<'_, HashMap<String, DealtDeck>>, ExternalError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ExternalError::ServiceUnavailable(
                "card dealer is not answering".to_string(),
            ));
        }
        Ok(self.decks.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn shuffle(&self, deck_type: DeckType) -> Vec<DeckCard> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        new_deck(deck_type, &mut *rng)
    }

    pub fn get(&self, name: &str) -> Result<Option<DealtDeck>, ExternalError> {
        Ok(self.decks()?.get(name).cloned())
    }

    /// Deal a deck under `name`. A deck already dealt under that name is
    /// returned unchanged.
    pub fn deal(&self, name: &str, deck_type: DeckType) -> Result<DealtDeck, ExternalError> {
        let mut decks = self.decks()?;
        if let Some(existing) = decks.get(name) {
            debug!(name, "deck already dealt");
            return Ok(existing.clone());
        }

        let dealt = DealtDeck {
            deck_type,
            cards: self.shuffle(deck_type),
        };
        decks.insert(name.to_string(), dealt.clone());
        debug!(name, deck_type = %deck_type, "dealt new deck");
        Ok(dealt)
    }

    /// Replace the deck under `name` when it was dealt with a different type.
    pub fn redeal(&self, name: &str, deck_type: DeckType) -> Result<DealtDeck, ExternalError> {
        let mut decks = self.decks()?;
        match decks.get(name).cloned() {
            None => Err(ExternalError::NotFound(format!("no deck dealt as {name}"))),
            Some(existing) if existing.deck_type == deck_type => Ok(existing),
            Some(_) => {
                let dealt = DealtDeck {
                    deck_type,
                    cards: self.shuffle(deck_type),
                };
                decks.insert(name.to_string(), dealt.clone());
                debug!(name, deck_type = %deck_type, "redealt deck");
                Ok(dealt)
            }
        }
    }

    /// Discard the deck under `name`. Returns whether one was held.
    pub fn discard(&self, name: &str) -> Result<bool, ExternalError> {
        Ok(self.decks()?.remove(name).is_some())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.decks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
