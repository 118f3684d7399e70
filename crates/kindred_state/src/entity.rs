//! # Indexer Entities
//!
//! Richer, eventually consistent records mirrored by the indexer.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::status::{Stats, StatusVector};

/// Descriptive attributes only the indexer knows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Species key.
    pub species: String,
    /// Player-chosen name.
    pub name: String,
    /// Unix seconds of creation.
    pub born_at: u64,
}

/// Alive flag plus stats, as the indexer last saw them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    /// Whether the entity is alive.
    pub is_alive: bool,
    /// Stat block.
    pub stats: Stats,
}

/// Indexer view of the owner's entity. May lag the authoritative read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Owner address.
    pub owner: Address,
    /// Entity id. Zero marks a provisional snapshot staged before creation lands.
    pub entity_id: U256,
    /// Descriptive fields. `None` is a thin snapshot.
    pub descriptor: Option<Descriptor>,
    /// Status sub-record.
    pub status: StatusSummary,
}

impl EntitySnapshot {
    /// Builds a thin snapshot carrying only what the authoritative vector knows.
    #[must_use]
    pub fn thin(vector: &StatusVector) -> Self {
        Self {
            owner: vector.owner,
            entity_id: vector.entity_id,
            descriptor: None,
            status: StatusSummary {
                is_alive: vector.is_alive,
                stats: vector.stats,
            },
        }
    }

    /// Builds a provisional snapshot for an entity whose creation is in flight.
    #[must_use]
    pub fn provisional(owner: Address, descriptor: Descriptor) -> Self {
        Self {
            owner,
            entity_id: U256::ZERO,
            descriptor: Some(descriptor),
            status: StatusSummary {
                is_alive: true,
                stats: Stats::default(),
            },
        }
    }

    /// True when descriptive fields are missing.
    #[inline]
    #[must_use]
    pub fn is_thin(&self) -> bool {
        self.descriptor.is_none()
    }

    /// True for a snapshot staged before its entity id exists.
    #[inline]
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.entity_id.is_zero()
    }

    /// Copies alive flag and stats from an authoritative vector.
    pub fn mirror(&mut self, vector: &StatusVector) {
        self.status.is_alive = vector.is_alive;
        self.status.stats = vector.stats;
    }
}

/// The owner's player record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Owner address.
    pub owner: Address,
    /// The owner's pointer to their current entity.
    pub current_entity_id: U256,
}
