//! # Status Vector
//!
//! The authoritative status read, parsed exactly once at the boundary.
//!
//! ## Wire Layout
//!
//! ```text
//! [0] owner        [1] entity id   [2] alive     [3] awake      [4] hunger
//! [5] energy       [6] happiness   [7] hygiene   [8] critical   [9] updated at
//! ```
//!
//! Anything that is not exactly this shape is rejected; nothing downstream
//! indexes the raw words.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::StatusParseError;

/// Number of words in a well-formed status read.
pub const STATUS_WORDS: usize = 10;

/// Ceiling of every stat value.
pub const STAT_MAX: u8 = 100;

const IDX_OWNER: usize = 0;
const IDX_ENTITY: usize = 1;
const IDX_ALIVE: usize = 2;
const IDX_AWAKE: usize = 3;
const IDX_CRITICAL: usize = 8;
const IDX_UPDATED: usize = 9;

/// One of the four bounded stats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    /// Satiety - higher is fuller.
    Hunger,
    /// Energy.
    Energy,
    /// Happiness.
    Happiness,
    /// Hygiene.
    Hygiene,
}

impl Stat {
    /// All stats in wire order.
    pub const ALL: [Self; 4] = [Self::Hunger, Self::Energy, Self::Happiness, Self::Hygiene];

    /// Word position of this stat in the raw vector.
    #[inline]
    #[must_use]
    pub const fn word_index(self) -> usize {
        match self {
            Self::Hunger => 4,
            Self::Energy => 5,
            Self::Happiness => 6,
            Self::Hygiene => 7,
        }
    }
}

/// A field a mutation may write optimistically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusField {
    /// One of the stats.
    Stat(Stat),
    /// The awake flag.
    Awake,
}

/// The four stat values, each in `0..=STAT_MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Satiety.
    pub hunger: u8,
    /// Energy.
    pub energy: u8,
    /// Happiness.
    pub happiness: u8,
    /// Hygiene.
    pub hygiene: u8,
}

impl Stats {
    /// Creates a stat block, clamping every value to the ceiling.
    #[must_use]
    pub fn new(hunger: u8, energy: u8, happiness: u8, hygiene: u8) -> Self {
        Self {
            hunger: hunger.min(STAT_MAX),
            energy: energy.min(STAT_MAX),
            happiness: happiness.min(STAT_MAX),
            hygiene: hygiene.min(STAT_MAX),
        }
    }

    /// Reads one stat.
    #[inline]
    #[must_use]
    pub const fn get(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Hunger => self.hunger,
            Stat::Energy => self.energy,
            Stat::Happiness => self.happiness,
            Stat::Hygiene => self.hygiene,
        }
    }

    /// Writes one stat, clamped to the ceiling.
    #[inline]
    pub fn set(&mut self, stat: Stat, value: u8) {
        let value = value.min(STAT_MAX);
        match stat {
            Stat::Hunger => self.hunger = value,
            Stat::Energy => self.energy = value,
            Stat::Happiness => self.happiness = value,
            Stat::Hygiene => self.hygiene = value,
        }
    }

    /// Lowest of the four values.
    #[must_use]
    pub fn min_value(&self) -> u8 {
        Stat::ALL.iter().map(|s| self.get(*s)).min().unwrap_or(0)
    }
}

/// Parsed authoritative status of the owner's entity.
///
/// Only the contract read produces this. The indexer never does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVector {
    /// Owner address.
    pub owner: Address,
    /// Entity id. Zero is the null id.
    pub entity_id: U256,
    /// Whether the entity is alive.
    pub is_alive: bool,
    /// Whether the entity is awake.
    pub is_awake: bool,
    /// Stat block.
    pub stats: Stats,
    /// Derived by the contract from the stats.
    pub is_critical: bool,
    /// Unix seconds of the last on-chain update.
    pub updated_at: u64,
}

impl StatusVector {
    /// Parses a raw contract read.
    ///
    /// # Errors
    ///
    /// Any deviation from the ten-word layout: wrong length, a non-boolean
    /// flag, a stat above [`STAT_MAX`], an owner wider than 160 bits or a
    /// timestamp wider than 64 bits.
    pub fn from_words(words: &[U256]) -> Result<Self, StatusParseError> {
        if words.len() != STATUS_WORDS {
            return Err(StatusParseError::Length(words.len()));
        }

        let mut stats = Stats::default();
        for stat in Stat::ALL {
            let word = words[stat.word_index()];
            let value = small_word(&word)
                .and_then(|v| u8::try_from(v).ok())
                .filter(|v| *v <= STAT_MAX)
                .ok_or(StatusParseError::StatOutOfRange { stat, value: word })?;
            stats.set(stat, value);
        }

        Ok(Self {
            owner: word_to_address(&words[IDX_OWNER])?,
            entity_id: words[IDX_ENTITY],
            is_alive: word_to_flag(words, IDX_ALIVE)?,
            is_awake: word_to_flag(words, IDX_AWAKE)?,
            stats,
            is_critical: word_to_flag(words, IDX_CRITICAL)?,
            updated_at: small_word(&words[IDX_UPDATED])
                .ok_or(StatusParseError::Timestamp(words[IDX_UPDATED]))?,
        })
    }

    /// Encodes back into the raw ten-word layout.
    #[must_use]
    pub fn to_words(&self) -> [U256; STATUS_WORDS] {
        let mut owner = [0u8; 32];
        owner[12..].copy_from_slice(self.owner.as_slice());

        let mut words = [U256::ZERO; STATUS_WORDS];
        words[IDX_OWNER] = U256::from_be_bytes(owner);
        words[IDX_ENTITY] = self.entity_id;
        words[IDX_ALIVE] = U256::from(u8::from(self.is_alive));
        words[IDX_AWAKE] = U256::from(u8::from(self.is_awake));
        for stat in Stat::ALL {
            words[stat.word_index()] = U256::from(self.stats.get(stat));
        }
        words[IDX_CRITICAL] = U256::from(u8::from(self.is_critical));
        words[IDX_UPDATED] = U256::from(self.updated_at);
        words
    }

    /// True when the vector names a real, living entity.
    #[inline]
    #[must_use]
    pub fn has_live_entity(&self) -> bool {
        self.is_alive && !self.entity_id.is_zero()
    }

    /// Reads a mutable field as a byte (flags are 0/1).
    #[must_use]
    pub const fn field(&self, field: StatusField) -> u8 {
        match field {
            StatusField::Stat(stat) => self.stats.get(stat),
            StatusField::Awake => self.is_awake as u8,
        }
    }

    /// Writes a mutable field from a byte (flags treat non-zero as set).
    pub fn set_field(&mut self, field: StatusField, value: u8) {
        match field {
            StatusField::Stat(stat) => self.stats.set(stat, value),
            StatusField::Awake => self.is_awake = value != 0,
        }
    }
}

/// Value of a word that fits in 64 bits.
fn small_word(word: &U256) -> Option<u64> {
    (word.bit_len() <= 64).then(|| word.as_limbs()[0])
}

fn word_to_flag(words: &[U256], index: usize) -> Result<bool, StatusParseError> {
    match small_word(&words[index]) {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        _ => Err(StatusParseError::Flag {
            index,
            value: words[index],
        }),
    }
}

fn word_to_address(word: &U256) -> Result<Address, StatusParseError> {
    if word.bit_len() > 160 {
        return Err(StatusParseError::Owner(*word));
    }
    let bytes: [u8; 32] = word.to_be_bytes();
    Ok(Address::from_slice(&bytes[12..]))
}
