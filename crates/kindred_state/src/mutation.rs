//! # Mutation Classes
//!
//! Each class owns a disjoint set of status fields, so classes may run
//! concurrently without clobbering each other.

use serde::{Deserialize, Serialize};

use crate::status::{Stat, StatusField};

const CLASS_COUNT: usize = 5;

/// A category of state-changing action serialized independently of others.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationClass {
    /// Raises hunger (satiety).
    Feed,
    /// Raises hygiene.
    Clean,
    /// Raises happiness.
    Play,
    /// Toggles the awake flag.
    Sleep,
    /// Creates a new entity.
    Spawn,
}

impl MutationClass {
    /// Every class.
    pub const ALL: [Self; CLASS_COUNT] = [Self::Feed, Self::Clean, Self::Play, Self::Sleep, Self::Spawn];

    /// Fields this class writes optimistically.
    #[must_use]
    pub const fn owned_fields(self) -> &'static [StatusField] {
        match self {
            Self::Feed => &[StatusField::Stat(Stat::Hunger)],
            Self::Clean => &[StatusField::Stat(Stat::Hygiene)],
            Self::Play => &[StatusField::Stat(Stat::Happiness)],
            Self::Sleep => &[StatusField::Awake],
            Self::Spawn => &[],
        }
    }

    /// True for mutations that change the authoritative entity id.
    #[inline]
    #[must_use]
    pub const fn is_creating(self) -> bool {
        matches!(self, Self::Spawn)
    }

    /// Short name for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Clean => "clean",
            Self::Play => "play",
            Self::Sleep => "sleep",
            Self::Spawn => "spawn",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Feed => 0,
            Self::Clean => 1,
            Self::Play => 2,
            Self::Sleep => 3,
            Self::Spawn => 4,
        }
    }
}

/// One in-flight boolean per mutation class.
///
/// Callers check and set these; nothing here enforces exclusion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InFlightFlags([bool; CLASS_COUNT]);

impl InFlightFlags {
    /// Whether a class is in flight.
    #[inline]
    #[must_use]
    pub const fn get(&self, class: MutationClass) -> bool {
        self.0[class.index()]
    }

    /// Sets or clears a class.
    #[inline]
    pub fn set(&mut self, class: MutationClass, in_flight: bool) {
        self.0[class.index()] = in_flight;
    }

    /// Classes currently in flight.
    pub fn active(&self) -> impl Iterator<Item = MutationClass> + '_ {
        MutationClass::ALL.into_iter().filter(|c| self.get(*c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_owned_fields_are_disjoint() {
        let mut seen = HashSet::new();
        for class in MutationClass::ALL {
            for field in class.owned_fields() {
                assert!(seen.insert(*field), "{field:?} owned twice");
            }
        }
    }

    #[test]
    fn test_flags_are_independent() {
        let mut flags = InFlightFlags::default();
        flags.set(MutationClass::Feed, true);
        flags.set(MutationClass::Clean, true);
        flags.set(MutationClass::Feed, false);

        assert!(!flags.get(MutationClass::Feed));
        assert!(flags.get(MutationClass::Clean));
        assert_eq!(flags.active().collect::<Vec<_>>(), vec![MutationClass::Clean]);
    }
}
