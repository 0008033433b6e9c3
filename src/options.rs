//! Detector configuration.
//!
//! A [`DetectorConfig`] is assembled once through its builder and is
//! immutable afterwards; any number of sequential detection runs may share
//! it. The builder appends user filters after the built-in chain and
//! validates retry bounds before a run can start.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::filter::{default_filters, Filter};
use crate::retry::{blocking_sleep, SleepFn};
use crate::snapshot::StackSource;
use crate::stack::{parse_trusted, Stack};

/// Retry attempts when leaked-looking goroutines are still present.
pub(crate) const DEFAULT_RETRY_ATTEMPTS: u32 = 20;

/// Ceiling on the backoff sleep between attempts.
pub(crate) const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_micros(100);

/// Invalid configuration, rejected before any detection run starts.
///
/// The retry bound is unsigned, so the only runtime check left is the
/// sleep ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max sleep interval should be greater than 0s")]
    NonPositiveSleep,
}

/// Callback invoked by [`crate::verify_none`] with a status code after the
/// check completes: 0 on success, 1 when leaks were found.
pub type CleanupFn = dyn Fn(i32) + Send + Sync;

/// Immutable configuration for leak detection runs.
pub struct DetectorConfig {
    pub(crate) filters: Vec<Filter>,
    pub(crate) max_retries: u32,
    pub(crate) max_sleep: Duration,
    pub(crate) cleanup: Option<Box<CleanupFn>>,
    pub(crate) sleep: Box<SleepFn<'static>>,
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("filters", &self.filters.len())
            .field("max_retries", &self.max_retries)
            .field("max_sleep", &self.max_sleep)
            .field("cleanup", &self.cleanup.as_ref().map(|_| "<fn>"))
            .finish_non_exhaustive()
    }
}

impl DetectorConfig {
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::new()
    }

    /// True if any configured filter excludes `stack` from leak
    /// consideration. Short-circuits on the first match; the outcome is
    /// order independent.
    pub(crate) fn excluded(&self, stack: &Stack) -> bool {
        self.filters.iter().any(|filter| filter(stack))
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            max_retries: DEFAULT_RETRY_ATTEMPTS,
            max_sleep: DEFAULT_SLEEP_INTERVAL,
            cleanup: None,
            sleep: Box::new(blocking_sleep),
        }
    }
}

/// Builder for [`DetectorConfig`].
pub struct DetectorConfigBuilder {
    user_filters: Vec<Filter>,
    baseline: Option<HashSet<u64>>,
    max_retries: u32,
    max_sleep: Duration,
    cleanup: Option<Box<CleanupFn>>,
    sleep: Box<SleepFn<'static>>,
}

impl DetectorConfigBuilder {
    fn new() -> Self {
        Self {
            user_filters: Vec::new(),
            baseline: None,
            max_retries: DEFAULT_RETRY_ATTEMPTS,
            max_sleep: DEFAULT_SLEEP_INTERVAL,
            cleanup: None,
            sleep: Box::new(blocking_sleep),
        }
    }

    /// Exclude stacks matched by an arbitrary predicate. User filters run
    /// after the built-in chain.
    pub fn filter(mut self, f: impl Fn(&Stack) -> bool + Send + Sync + 'static) -> Self {
        self.user_filters.push(Box::new(f));
        self
    }

    /// Exclude any goroutine with the fully qualified `name` on top of its
    /// stack, e.g. `example.com/pkg.Worker`.
    pub fn ignore_top_function(self, name: &str) -> Self {
        let name = name.to_string();
        self.filter(move |s| s.first_function() == name)
    }

    /// Exclude any goroutine with the fully qualified `name` anywhere in
    /// its stack, creator frame included.
    pub fn ignore_any_function(self, name: &str) -> Self {
        let name = name.to_string();
        self.filter(move |s| s.has_function(name.as_str()))
    }

    /// Record the IDs of every goroutine currently alive in `source` and
    /// exclude them from all later runs of this detector, whatever state
    /// they are in by then.
    pub fn ignore_current(mut self, source: &dyn StackSource) -> anyhow::Result<Self> {
        let dump = source.capture_all()?;
        let ids = self.baseline.get_or_insert_with(HashSet::new);
        for stack in parse_trusted(&dump) {
            ids.insert(stack.id());
        }
        Ok(self)
    }

    /// Upper bound on retry attempts while leaked-looking goroutines
    /// remain. Defaults to 20.
    pub fn max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts;
        self
    }

    /// Ceiling on the backoff sleep between attempts. Defaults to 100µs;
    /// must be greater than zero.
    pub fn max_sleep(mut self, ceiling: Duration) -> Self {
        self.max_sleep = ceiling;
        self
    }

    /// Run `f` with a status code once verification finishes. Only honored
    /// by [`crate::verify_none`]; [`crate::find`] rejects configs that set
    /// it.
    pub fn cleanup(mut self, f: impl Fn(i32) + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Box::new(f));
        self
    }

    /// Replace the blocking sleep used between retries. Test seam.
    pub fn sleep_with(mut self, f: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(f);
        self
    }

    /// Validate and assemble the final configuration: built-in filters
    /// first, then the baseline (if captured), then user filters.
    pub fn build(self) -> Result<DetectorConfig, ConfigError> {
        if self.max_sleep.is_zero() {
            return Err(ConfigError::NonPositiveSleep);
        }

        let mut filters = default_filters();
        if let Some(ids) = self.baseline {
            filters.push(Box::new(move |s: &Stack| ids.contains(&s.id())));
        }
        filters.extend(self.user_filters);

        Ok(DetectorConfig {
            filters,
            max_retries: self.max_retries,
            max_sleep: self.max_sleep,
            cleanup: self.cleanup,
            sleep: self.sleep,
        })
    }
}
