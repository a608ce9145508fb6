//! Reconnect backoff for the watch loops.

use std::time::Duration;

const BASE: Duration = Duration::from_secs(1);
const MAX: Duration = Duration::from_secs(60);

/// Exponential backoff: doubles per failure up to a cap, reset on the
/// first successfully processed event.
#[derive(Debug)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { current: BASE }
    }

    /// The delay to wait before the next reconnect attempt.
    pub fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX);
        delay
    }

    pub fn reset(&mut self) {
        self.current = BASE;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
