#![no_main]

use labelgen::service::parse_upc_csv;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Uploaded CSV bodies are untrusted; parsing must never panic.
    let text = String::from_utf8_lossy(data);
    let import = parse_upc_csv(&text);

    for row in &import.rows {
        assert!(!row.part_number.trim().is_empty());
        if let Some(upc) = &row.upc {
            assert!(!upc.is_empty());
        }
    }
    assert!(import.rows.len() + import.errors.len() <= text.lines().count());
});
