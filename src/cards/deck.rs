//! # Deck Generation

use crate::crd::DeckCard;
use crate::managed::ExternalError;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

pub const SUITS: [&str; 4] = ["♠", "♥", "♦", "♣"];

pub const RANKS: [&str; 13] = [
    "2", "3", "4", "5", "6", "7", "8", "9", "10", "J", "Q", "K", "A",
];

/// How a deck is dealt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeckType {
    #[default]
    Shuffled,
    /// Factory order: suits in order, ranks ascending
    Ordered,
    /// A discard pile
    Empty,
}

impl DeckType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeckType::Shuffled => "Shuffled",
            DeckType::Ordered => "Ordered",
            DeckType::Empty => "Empty",
        }
    }

    /// Resolve the type requested in a Deck spec; unset means `Shuffled`
    pub fn from_spec(value: Option<&str>) -> Result<Self, ExternalError> {
        value.map_or(Ok(DeckType::default()), str::parse)
    }
}

impl fmt::Display for DeckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeckType {
    type Err = ExternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shuffled" => Ok(DeckType::Shuffled),
            "Ordered" => Ok(DeckType::Ordered),
            "Empty" => Ok(DeckType::Empty),
            other => Err(ExternalError::InvalidRequest(format!(
                "unknown deck type {other:?}, expected Shuffled, Ordered or Empty"
            ))),
        }
    }
}

/// All 52 cards in factory order
#[must_use]
pub fn ordered_deck() -> Vec<DeckCard> {
    SUITS
        .iter()
        .flat_map(|suit| {
            RANKS.iter().map(move |rank| DeckCard {
                suit: (*suit).to_string(),
                rank: (*rank).to_string(),
            })
        })
        .collect()
}

/// Deal a fresh deck of the given type
pub fn new_deck<R: Rng + ?Sized>(deck_type: DeckType, rng: &mut R) -> Vec<DeckCard> {
    match deck_type {
        DeckType::Empty => Vec::new(),
        DeckType::Ordered => ordered_deck(),
        DeckType::Shuffled => {
            let mut cards = ordered_deck();
            cards.shuffle(rng);
            cards
        }
    }
}
