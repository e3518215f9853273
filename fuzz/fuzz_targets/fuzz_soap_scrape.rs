#![no_main]

use libfuzzer_sys::fuzz_target;
use timbrado::wire::soap;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Malformed XML must come back as None or empty, never a panic.
        let _ = soap::scrape_tag(s, "uuid");
        let _ = soap::scrape_tag_nonempty(s, "serie");
        let _ = soap::scrape_error_blocks(s, "error");
    }
});
