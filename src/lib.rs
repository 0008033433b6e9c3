//! Leakcheck - Goroutine leak detection over runtime stack dumps
//!
//! This library finds background goroutines that are still alive after a
//! test or program phase should have quiesced. It parses a raw stack dump
//! into typed records, excludes known-benign background goroutines through
//! a filter chain, and retries with capped exponential backoff so units
//! that are merely slow to finish are not reported as leaks.
//!
//! Dump acquisition is abstracted behind [`StackSource`], so the whole
//! engine runs against synthetic dump text in tests.
//!
//! # Example
//!
//! ```
//! use leakcheck::{find, DetectorConfig, StackSource};
//!
//! struct Quiet;
//!
//! impl StackSource for Quiet {
//!     fn capture_all(&self) -> anyhow::Result<String> {
//!         Ok("goroutine 1 [running]:\nmain.main()\n\tmain.go:3 +0x1\n".into())
//!     }
//!     fn capture_current(&self) -> anyhow::Result<String> {
//!         Ok("goroutine 1 [running]:\nmain.main()\n\tmain.go:3 +0x1\n".into())
//!     }
//! }
//!
//! let config = DetectorConfig::builder()
//!     .ignore_top_function("example.com/pkg.knownLeaker")
//!     .build()
//!     .unwrap();
//! assert!(find(&Quiet, &config).is_ok());
//! ```

pub mod detector;
pub mod filter;
pub mod options;
pub mod retry;
pub mod snapshot;
pub mod stack;

pub use detector::{find, verify_none, LeakError, LeakReport};
pub use filter::Filter;
pub use options::{ConfigError, DetectorConfig, DetectorConfigBuilder};
pub use snapshot::{capture_growable, StackSource};
pub use stack::{ParseError, Stack, StackParser};
