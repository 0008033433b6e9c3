//! The leak detection loop.
//!
//! One run snapshots every live goroutine, drops the detector's own and
//! everything the filter chain excludes, and treats whatever remains as a
//! leak candidate. Because a snapshot is eventually consistent — the
//! program under test keeps spawning and finishing goroutines while we
//! look — a non-empty candidate set triggers backoff and another snapshot
//! rather than an immediate failure. The run ends in success once a
//! snapshot comes back clean, or in a [`LeakError::Leak`] carrying the
//! survivors once the retry budget is spent.

use std::fmt;

use thiserror::Error;

use crate::options::DetectorConfig;
use crate::retry::RetryPolicy;
use crate::snapshot::StackSource;
use crate::stack::{parse_trusted, Stack};

/// Goroutines that survived filtering after retries were exhausted,
/// sorted ascending by ID so diagnostics are reproducible regardless of
/// capture order.
#[derive(Debug)]
pub struct LeakReport {
    leaked: Vec<Stack>,
}

impl LeakReport {
    fn new(mut leaked: Vec<Stack>) -> Self {
        leaked.sort_by_key(Stack::id);
        Self { leaked }
    }

    /// The leaked stacks, ascending by ID. Never empty.
    pub fn stacks(&self) -> &[Stack] {
        &self.leaked
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stack) in self.leaked.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{stack}")?;
        }
        Ok(())
    }
}

/// Failure modes of a detection run.
#[derive(Debug, Error)]
pub enum LeakError {
    /// Goroutines were still alive and unfiltered after the retry budget
    /// was exhausted. A verification failure, not a defect in the caller.
    #[error("found unexpected goroutines:\n{0}")]
    Leak(LeakReport),

    /// The snapshot capability could not produce a dump. Fatal to this
    /// run; never retried.
    #[error("capture stack dump: {0}")]
    Capture(#[source] anyhow::Error),

    /// A cleanup callback was configured but [`find`] cannot honor one.
    #[error("cleanup can only be used with verify_none")]
    CleanupNotAllowed,
}

/// Report any goroutines currently alive that no filter excludes.
///
/// Retries with capped exponential backoff while candidates remain, since
/// they may simply not have finished yet. Rejects configs carrying a
/// cleanup callback; use [`verify_none`] for those.
pub fn find<S: StackSource + ?Sized>(
    source: &S,
    config: &DetectorConfig,
) -> Result<(), LeakError> {
    if config.cleanup.is_some() {
        return Err(LeakError::CleanupNotAllowed);
    }
    detect(source, config)
}

/// Run leak detection, then invoke the configured cleanup callback (if
/// any) with status 0 on success or 1 when leaks were found.
pub fn verify_none<S: StackSource + ?Sized>(
    source: &S,
    config: &DetectorConfig,
) -> Result<(), LeakError> {
    let result = detect(source, config);
    if let Some(cleanup) = &config.cleanup {
        cleanup(i32::from(result.is_err()));
    }
    result
}

fn detect<S: StackSource + ?Sized>(source: &S, config: &DetectorConfig) -> Result<(), LeakError> {
    // The detector's own goroutine is always live during a snapshot;
    // identify it up front so it is never reported.
    let own_id = current_stack(source)?.id();

    let mut retry = RetryPolicy::new(config.max_retries, config.max_sleep, config.sleep.as_ref());
    loop {
        let leaked = candidate_leaks(source, config, own_id)?;
        if leaked.is_empty() {
            return Ok(());
        }

        tracing::debug!(candidates = leaked.len(), "goroutines still unaccounted for");
        if !retry.backoff() {
            return Err(LeakError::Leak(LeakReport::new(leaked)));
        }
    }
}

/// Snapshot every live goroutine and keep the ones that are neither the
/// detector itself nor excluded by the filter chain.
fn candidate_leaks<S: StackSource + ?Sized>(
    source: &S,
    config: &DetectorConfig,
    own_id: u64,
) -> Result<Vec<Stack>, LeakError> {
    let dump = source.capture_all().map_err(LeakError::Capture)?;
    Ok(parse_trusted(&dump)
        .into_iter()
        .filter(|s| s.id() != own_id && !config.excluded(s))
        .collect())
}

/// The calling goroutine's own record.
fn current_stack<S: StackSource + ?Sized>(source: &S) -> Result<Stack, LeakError> {
    let dump = source.capture_current().map_err(LeakError::Capture)?;
    let mut stacks = parse_trusted(&dump);
    if stacks.is_empty() {
        return Err(LeakError::Capture(anyhow::anyhow!(
            "self-capture produced an empty dump"
        )));
    }
    Ok(stacks.remove(0))
}
