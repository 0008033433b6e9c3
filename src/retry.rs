//! Capped exponential backoff between snapshot attempts.
//!
//! A goroutine that is about to finish can show up in one snapshot and be
//! gone by the next, so the detector waits a little and looks again rather
//! than failing on the first sighting. The wait is a blocking sleep through
//! an injectable function, which lets tests record the exact delay sequence
//! without any real elapsed time.

use std::thread;
use std::time::Duration;

/// Smallest backoff step; the delay doubles from here each attempt.
const BASE_UNIT: Duration = Duration::from_micros(1);

/// Blocking wait primitive. The default is [`std::thread::sleep`].
pub type SleepFn<'a> = dyn Fn(Duration) + Send + Sync + 'a;

/// Backoff state for a single detection run.
///
/// Not shared: each run owns one policy and drives it sequentially.
pub struct RetryPolicy<'a> {
    attempt: u32,
    max_retries: u32,
    max_sleep: Duration,
    sleep: &'a SleepFn<'a>,
}

impl<'a> RetryPolicy<'a> {
    pub fn new(max_retries: u32, max_sleep: Duration, sleep: &'a SleepFn<'a>) -> Self {
        Self {
            attempt: 0,
            max_retries,
            max_sleep,
            sleep,
        }
    }

    /// Wait for the next backoff interval and report whether the caller
    /// should take another snapshot.
    ///
    /// Once the retry budget is spent this returns `false` without
    /// sleeping or changing state. Otherwise it blocks for
    /// `min(1µs << attempt, max_sleep)`, advances, and returns `true`.
    pub fn backoff(&mut self) -> bool {
        if self.attempt >= self.max_retries {
            return false;
        }

        let delay = match 1u64.checked_shl(self.attempt) {
            Some(micros) => Duration::from_micros(micros).min(self.max_sleep),
            // Shift past 63 attempts saturates at the ceiling.
            None => self.max_sleep,
        };
        (self.sleep)(delay);

        self.attempt += 1;
        true
    }
}

/// Blocking sleep used outside of tests.
pub fn blocking_sleep(d: Duration) {
    thread::sleep(d);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn run_to_exhaustion(max_retries: u32, max_sleep: Duration) -> Vec<Duration> {
        let recorded = Mutex::new(Vec::new());
        let sleep = |d: Duration| recorded.lock().unwrap().push(d);
        let mut policy = RetryPolicy::new(max_retries, max_sleep, &sleep);
        while policy.backoff() {}
        recorded.into_inner().unwrap()
    }

    #[test]
    fn test_delay_sequence_doubles_then_caps() {
        let delays = run_to_exhaustion(30, Duration::from_millis(1));
        assert_eq!(delays.len(), 30);

        for (i, delay) in delays.iter().take(10).enumerate() {
            assert_eq!(*delay, Duration::from_micros(1 << i), "attempt {i}");
        }
        for (i, delay) in delays.iter().enumerate().skip(10) {
            assert_eq!(*delay, Duration::from_millis(1), "attempt {i}");
        }
    }

    #[test]
    fn test_stop_bounded_by_max_retries_not_max_sleep() {
        // A tiny ceiling ends the growth early but never ends the run.
        let delays = run_to_exhaustion(7, Duration::from_micros(4));
        assert_eq!(delays.len(), 7);
        assert_eq!(delays[6], Duration::from_micros(4));
    }

    #[test]
    fn test_zero_retries_never_sleeps() {
        let delays = run_to_exhaustion(0, Duration::from_millis(1));
        assert!(delays.is_empty());
    }

    #[test]
    fn test_stop_leaves_state_unchanged() {
        let sleep = |_: Duration| {};
        let mut policy = RetryPolicy::new(1, Duration::from_micros(100), &sleep);
        assert!(policy.backoff());
        assert!(!policy.backoff());
        assert!(!policy.backoff());
    }

    #[test]
    fn test_large_attempt_count_saturates_at_ceiling() {
        let delays = run_to_exhaustion(70, Duration::from_micros(100));
        assert_eq!(delays.len(), 70);
        assert!(delays.iter().all(|d| *d <= Duration::from_micros(100)));
        assert_eq!(delays[69], Duration::from_micros(100));
    }
}
