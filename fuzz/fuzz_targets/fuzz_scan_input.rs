#![no_main]

use labelgen::service::parse_scan_input;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Scanner text is arbitrary; parsing must never panic.
    let text = String::from_utf8_lossy(data);

    if let Ok(pairs) = parse_scan_input(&text) {
        for pair in pairs {
            assert_eq!(pair.valid, pair.error.is_none());
            if pair.valid {
                assert!(!pair.part_number.is_empty());
                assert!(pair.quantity.is_some_and(|q| q > 0));
            }
        }
    }
});
