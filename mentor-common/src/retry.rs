use std::time;

#[derive(Copy, Clone, Debug)]
/// The retry policy the allocator follows when a selected mentor fills up before its slot is taken.
pub struct RetryPolicy {
    /// Total number of selection attempts, including the first one.
    max_attempts: u32,
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Return true if another attempt may follow the given (1-based) failed attempt.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Calculate the time to wait after the given (1-based) failed attempt.
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self
            .backoff_coefficient
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.initial_interval.checked_mul(factor));

        match (candidate_interval, self.maximum_interval) {
            (Some(interval), Some(max_interval)) => std::cmp::min(interval, max_interval),
            (Some(interval), None) => interval,
            (None, Some(max_interval)) => max_interval,
            (None, None) => time::Duration::MAX,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_coefficient: 2,
            initial_interval: time::Duration::from_millis(10),
            maximum_interval: Some(time::Duration::from_millis(100)),
        }
    }
}
