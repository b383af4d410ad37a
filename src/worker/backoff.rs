//! Delay between restarts of a failed session worker.

use std::time::Duration;

/// Exponential back-off applied when a session's worker keeps failing.
///
/// The first restart waits `initial_delay`; each further consecutive failure
/// doubles the wait up to `max_delay`.
///
/// # Default Values
/// - `initial_delay`: 10 milliseconds
/// - `max_delay`: 1 second
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl RestartBackoff {
    /// Clamp both delays to at least 1 ms and order them.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.initial_delay = self.initial_delay.max(Duration::from_millis(1));
        self.max_delay = self.max_delay.max(Duration::from_millis(1));
        if self.initial_delay > self.max_delay {
            std::mem::swap(&mut self.initial_delay, &mut self.max_delay);
        }
        self
    }

    /// Delay to use after `delay` failed again.
    #[must_use]
    pub fn next(&self, delay: Duration) -> Duration { (delay * 2).min(self.max_delay) }
}
