#![no_main]

use libfuzzer_sys::fuzz_target;
use leakcheck::StackParser;

fuzz_target!(|data: &[u8]| {
    // Convert arbitrary bytes to UTF-8 string (lossy inputs are skipped)
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing foreign text must collect errors, never panic
        let _ = StackParser::new(input).parse();
    }
});
