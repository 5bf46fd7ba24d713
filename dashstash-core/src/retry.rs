//! Bounded retry.

use std::time::Duration;

/// At most `attempts` tries, sleeping `interval` between them (not after the last).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryBudget {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Run `op` until it returns true or the budget is spent. Returns whether it succeeded.
    pub fn run(&self, mut op: impl FnMut(u32) -> bool) -> bool {
        for attempt in 1..=self.attempts {
            if op(attempt) {
                return true;
            }
            if attempt < self.attempts && !self.interval.is_zero() {
                std::thread::sleep(self.interval);
            }
        }
        false
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stops_after_budget() {
        let mut calls = 0;
        let ok = RetryBudget::new(10, Duration::ZERO).run(|_| {
            calls += 1;
            false
        });
        assert!(!ok);
        assert_eq!(calls, 10);
    }

    #[test]
    fn stops_on_first_success() {
        let mut calls = 0;
        let ok = RetryBudget::new(10, Duration::ZERO).run(|attempt| {
            calls += 1;
            attempt == 3
        });
        assert!(ok);
        assert_eq!(calls, 3);
    }

    #[test]
    fn sleeps_between_attempts_only() {
        let start = Instant::now();
        RetryBudget::new(3, Duration::from_millis(50)).run(|_| false);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150 + 500));
    }
}
