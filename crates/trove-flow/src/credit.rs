#![forbid(unsafe_code)]

/// Chunks the link will accept before it reports a delivery.
///
/// A chunk is counted on the way out and released when the peer confirms it.
/// A lost link drops every outstanding credit at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditWindow {
    max: usize,
    in_flight: usize,
}

impl CreditWindow {
    pub fn new(max: usize) -> Self {
        Self { max: core::cmp::max(max, 1), in_flight: 0 }
    }

    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.in_flight)
    }

    /// Take one credit. False when the window is closed.
    pub fn consume(&mut self) -> bool {
        if self.in_flight >= self.max { return false; }
        self.in_flight += 1;
        true
    }

    pub fn on_delivered(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.in_flight = 0;
    }

    pub fn in_flight(&self) -> usize { self.in_flight }

    pub fn max(&self) -> usize { self.max }
}
