//! # Stat Deltas
//!
//! Pure transforms from one status vector to the optimistic next one.
//! Values saturate at `0` and [`STAT_MAX`]. The increments come from
//! configuration; the contract's own tables stay on-chain.

use serde::{Deserialize, Serialize};

use crate::status::{Stat, Stats, StatusVector, STAT_MAX};

/// Per-action increments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaTable {
    /// Hunger gained per feed.
    pub feed: u8,
    /// Hygiene gained per clean.
    pub clean: u8,
    /// Happiness gained per play.
    pub play: u8,
    /// Energy spent to start a session.
    pub session_energy_cost: u8,
    /// A stat at or below this marks the entity critical.
    pub critical_threshold: u8,
}

impl Default for DeltaTable {
    fn default() -> Self {
        Self {
            feed: 20,
            clean: 25,
            play: 15,
            session_energy_cost: 10,
            critical_threshold: 10,
        }
    }
}

/// Recomputes the derived critical flag.
#[inline]
#[must_use]
pub fn derive_critical(stats: &Stats, threshold: u8) -> bool {
    stats.min_value() <= threshold
}

fn raise(status: &StatusVector, stat: Stat, amount: u8, table: &DeltaTable) -> StatusVector {
    let mut next = *status;
    let value = status.stats.get(stat).saturating_add(amount).min(STAT_MAX);
    next.stats.set(stat, value);
    next.is_critical = derive_critical(&next.stats, table.critical_threshold);
    next
}

/// Optimistic result of feeding.
#[must_use]
pub fn feed(status: &StatusVector, table: &DeltaTable) -> StatusVector {
    raise(status, Stat::Hunger, table.feed, table)
}

/// Optimistic result of cleaning.
#[must_use]
pub fn clean(status: &StatusVector, table: &DeltaTable) -> StatusVector {
    raise(status, Stat::Hygiene, table.clean, table)
}

/// Optimistic result of playing.
#[must_use]
pub fn play(status: &StatusVector, table: &DeltaTable) -> StatusVector {
    raise(status, Stat::Happiness, table.play, table)
}

/// Optimistic result of toggling sleep.
#[must_use]
pub fn toggle_sleep(status: &StatusVector) -> StatusVector {
    let mut next = *status;
    next.is_awake = !status.is_awake;
    next
}

/// Energy spent when a session starts.
#[must_use]
pub fn consume_energy(status: &StatusVector, table: &DeltaTable) -> StatusVector {
    let mut next = *status;
    next.stats.energy = status.stats.energy.saturating_sub(table.session_energy_cost);
    next.is_critical = derive_critical(&next.stats, table.critical_threshold);
    next
}
