//! Fuzz target for device line classification.
//!
//! `parse_line` must accept any text without panicking, and every count it
//! returns must render back into a line that parses to the same count.

#![no_main]

use gc_core::device::{parse_line, DeviceLine};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let DeviceLine::Count(count) = parse_line(data) {
        let rendered = format!("c{:3},{:3}\r\n", count.events, count.ticks);
        assert_eq!(parse_line(&rendered), DeviceLine::Count(count));
    }
});
