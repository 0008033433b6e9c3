//! Capture seam between the detector and the host runtime.
//!
//! The detector never calls into a runtime directly; it goes through
//! [`StackSource`], so the whole engine can be exercised against synthetic
//! dump text. A live provider wraps whatever introspection primitive the
//! host exposes and must return complete, untruncated dumps —
//! [`capture_growable`] implements the usual grow-and-retry acquisition for
//! fill-a-buffer primitives.

use anyhow::Result;

/// Initial buffer size for a dump request, doubled until the dump fits.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Source of raw stack dumps for live goroutines.
///
/// Both methods return text conforming to the dump grammar parsed by
/// [`crate::stack`]. Dumps from a real runtime are well-formed by contract;
/// a provider that cannot produce a dump at all should return an error,
/// which aborts the detection run it occurs in.
pub trait StackSource {
    /// Dump of every live goroutine, including the caller's own.
    fn capture_all(&self) -> Result<String>;

    /// Dump of just the calling goroutine.
    fn capture_current(&self) -> Result<String>;
}

/// Acquire a complete dump from a primitive that writes into a caller
/// supplied buffer and reports how many bytes it wrote.
///
/// A report equal to the buffer's length may mean truncation, so the buffer
/// is doubled and the request retried until the dump fits with room to
/// spare.
pub fn capture_growable(mut dump: impl FnMut(&mut [u8]) -> usize) -> Vec<u8> {
    let mut size = DEFAULT_BUFFER_SIZE;
    loop {
        let mut buf = vec![0u8; size];
        let n = dump(&mut buf);
        if n < buf.len() {
            buf.truncate(n);
            return buf;
        }
        size *= 2;
    }
}
