// Lamport logical clock
//
// A scalar counter that only moves forward:
// - `tick` stamps a message this process originates
// - `observe` fast-forwards past a timestamp seen on a received message
//
// If message A is received before message B is sent, ts(A) < ts(B).

/// Logical timestamp carried by every message id
pub type Timestamp = u64;

/// A process-local Lamport clock
///
/// The clock is plain data; it is owned by the `DeliveryEngine` and only
/// mutated from inside the engine's exclusion boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    value: Timestamp,
}

impl LamportClock {
    /// Create a clock starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock starting at an arbitrary value
    pub fn starting_at(value: Timestamp) -> Self {
        Self { value }
    }

    /// Advance by one and return the new value. `None` once the clock is
    /// exhausted; the clock is then left where it was.
    pub fn tick(&mut self) -> Option<Timestamp> {
        self.value = self.value.checked_add(1)?;
        Some(self.value)
    }

    /// Incorporate a remote timestamp: `max(local, remote) + 1`, or `None`
    /// without moving if that would overflow
    pub fn observe(&mut self, remote: Timestamp) -> Option<Timestamp> {
        self.value = self.value.max(remote).checked_add(1)?;
        Some(self.value)
    }

    /// Current value without advancing
    pub fn current(&self) -> Timestamp {
        self.value
    }
}

impl std::fmt::Display for LamportClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.value)
    }
}
