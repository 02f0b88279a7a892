use std::time::Duration;

use tokio::time::Instant;

/// Monotonic stopwatch that budgets time across the steps of a lock acquisition.
///
/// A timer only exists once started, so it can never be read before `start`.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started_at: Instant,
    clock: fn() -> Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self::start_with(Instant::now)
    }

    /// Start a timer that reads time from `clock`
    pub(crate) fn start_with(clock: fn() -> Instant) -> Self {
        Self {
            started_at: clock(),
            clock,
        }
    }

    pub fn elapsed(&self) -> Duration {
        (self.clock)().saturating_duration_since(self.started_at)
    }

    /// Whole milliseconds since start, rounded down
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Time left of `budget`, or `None` once the budget has been overrun
    pub fn remaining(&self, budget: Duration) -> Option<Duration> {
        budget.checked_sub(self.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_follows_clock() {
        let timer = Timer::start();
        assert_eq!(timer.elapsed_ms(), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(timer.elapsed_ms(), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_budget() {
        let timer = Timer::start();
        let budget = Duration::from_millis(100);

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(timer.remaining(budget), Some(Duration::from_millis(60)));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(timer.remaining(budget), Some(Duration::ZERO));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(timer.remaining(budget), None);
    }
}
