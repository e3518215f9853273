#![no_main]

use libfuzzer_sys::fuzz_target;
use timbrado::company::ProviderCode;
use timbrado::providers::{ProviderAdapter, adapter_for};
use timbrado::result::parse_certified_at;

const ALL: [ProviderCode; 6] = [
    ProviderCode::Infile,
    ProviderCode::Digifact,
    ProviderCode::Contap,
    ProviderCode::MegaPrint,
    ProviderCode::Ecofactura,
    ProviderCode::Eforcon,
];

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Response parsing must swallow any body; panics are bugs.
        for code in ALL {
            let adapter = adapter_for(code).unwrap();
            let _ = adapter.parse_certify_response(s);
            let _ = adapter.parse_cancel_response(s);
        }
        let _ = parse_certified_at(s);
    }
});
