use std::time::{Duration, Instant};

/// Wall-clock budget each side starts with.
pub const INITIAL_BUDGET: Duration = Duration::from_secs(5 * 60);

/// Per-side countdown clock. Pure timer state, no I/O and no callbacks:
/// expiry is detected by comparison, and whoever stops the clock commits
/// the elapsed time against the remaining budget. Backed by `Instant` so
/// the arithmetic is monotonic; the budget subtraction saturates at zero
/// so a skewed or long-suspended host can never produce negative time.
#[derive(Debug, Clone)]
pub struct Clock {
    remaining: Duration,
    started_at: Option<Instant>,
}

impl Clock {
    pub fn new() -> Self {
        Self::with_budget(INITIAL_BUDGET)
    }

    pub fn with_budget(budget: Duration) -> Self {
        Clock {
            remaining: budget,
            started_at: None,
        }
    }

    /// Begin counting down. Starting an already-running clock is a no-op.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stop the clock and commit the elapsed time against the budget.
    /// Returns the elapsed duration since `start`; zero if not running.
    pub fn stop(&mut self) -> Duration {
        match self.started_at.take() {
            Some(started) => {
                let elapsed = started.elapsed();
                self.remaining = self.remaining.saturating_sub(elapsed);
                elapsed
            }
            None => Duration::ZERO,
        }
    }

    /// Budget left at this instant, counting down live while running.
    pub fn remaining(&self) -> Duration {
        match self.started_at {
            Some(started) => self.remaining.saturating_sub(started.elapsed()),
            None => self.remaining,
        }
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
