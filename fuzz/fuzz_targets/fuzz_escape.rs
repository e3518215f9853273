#![no_main]

use libfuzzer_sys::fuzz_target;
use timbrado::core::{EscapeMode, escape_value, strip_accents, strip_html, strip_nit};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        for mode in [EscapeMode::NumericRefs, EscapeMode::Plain] {
            let escaped = escape_value(s, mode);
            // Escaped text re-escapes without panicking.
            let _ = escape_value(&escaped, mode);
        }
        let _ = strip_nit(s);
        let _ = strip_accents(s);
        let _ = strip_html(s);
    }
});
