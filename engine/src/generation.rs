//! Monotonic generation tags for telling the latest async request apart
//! from stale ones.
//!
//! Every logical request stream (search terms, store loads) owns one
//! counter. Starting a request ticks the counter and tags the request with
//! the new value; a completion is only allowed to write state if its tag
//! is still current. Responses that arrive out of send order are dropped
//! instead of overwriting newer data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A generation tag. Higher is newer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The generation before any request was issued.
    pub const ZERO: Generation = Generation(0);

    /// Create a generation with a specific value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Advance to the next generation and return it.
    pub fn tick(&mut self) -> Generation {
        self.0 += 1;
        *self
    }

    /// Whether a response tagged with `tag` may still write state.
    pub fn is_current(&self, tag: Generation) -> bool {
        self.0 == tag.0
    }

    /// Whether `tag` was superseded by this generation.
    pub fn supersedes(&self, tag: Generation) -> bool {
        tag.0 < self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(Generation::default(), Generation::ZERO);
        assert_eq!(Generation::ZERO.value(), 0);
    }

    #[test]
    fn tick_returns_new_value() {
        let mut generation = Generation::default();
        let first = generation.tick();
        let second = generation.tick();
        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 2);
        assert!(first < second);
    }

    #[test]
    fn only_latest_tag_is_current() {
        let mut generation = Generation::default();
        let stale = generation.tick();
        let latest = generation.tick();

        assert!(generation.is_current(latest));
        assert!(!generation.is_current(stale));
        assert!(generation.supersedes(stale));
        assert!(!generation.supersedes(latest));
    }

    #[test]
    fn display() {
        assert_eq!(Generation::new(7).to_string(), "g7");
    }
}
