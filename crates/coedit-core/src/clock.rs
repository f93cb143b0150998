//! Lamport logical clock scoped to one session.

/// Monotonically advancing logical counter used to prioritize concurrent
/// inserts. The server never originates edits, so it mostly [`observe`]s
/// the clocks carried by remote operations; [`tick`] exists for local events.
///
/// [`observe`]: LamportClock::observe
/// [`tick`]: LamportClock::tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    /// Creates a new clock initialized to 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Returns the current clock value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Increments the clock for a local event and returns the new value.
    pub fn tick(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Advances the clock to `max(self, seen)` after merging a remote
    /// operation. Never decreases.
    pub fn observe(&mut self, seen: u64) -> u64 {
        self.value = self.value.max(seen);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(LamportClock::new().value(), 0);
    }

    #[test]
    fn tick_increments() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn observe_takes_max() {
        let mut clock = LamportClock::new();
        clock.observe(5);
        assert_eq!(clock.value(), 5);
        clock.observe(3);
        assert_eq!(clock.value(), 5);
        clock.observe(9);
        assert_eq!(clock.value(), 9);
    }
}
