#![allow(dead_code)]

use labelgen::contracts::{InventoryStore, LabelError};
use labelgen::service::{format_serial, parse_scan_input, Allocator};
use proptest::prelude::*;

// Property checks written against any InventoryStore; the RocksDB store
// plugs in through the `tests` module below.

// =============================================================================
// Allocation ranges
// =============================================================================

/// Property: each allocation returns exactly `q` consecutive serials starting
/// at the counter, and the counter advances by `q`.
pub fn prop_allocation_is_contiguous<S: InventoryStore>(
    allocator: &Allocator<S>,
    quantities: &[i64],
) {
    let mut expected_next = allocator
        .store()
        .counter()
        .unwrap()
        .map(|c| c.current_serial)
        .unwrap_or(500);

    for &q in quantities {
        let allocation = allocator.allocate("PROP-1", q).expect("allocation should succeed");
        let digits = allocator.store().counter().unwrap().unwrap().serial_digits;

        let expected: Vec<String> = (expected_next..expected_next + q as u64)
            .map(|n| format_serial(n, digits))
            .collect();
        assert_eq!(allocation.serials, expected);
        expected_next += q as u64;

        let counter = allocator.store().counter().unwrap().unwrap();
        assert_eq!(counter.current_serial, expected_next);
    }
}

/// Property: a rejected quantity leaves the counter where it was.
pub fn prop_invalid_quantity_changes_nothing<S: InventoryStore>(
    allocator: &Allocator<S>,
    quantity: i64,
) {
    let before = allocator.store().counter().unwrap();
    let err = allocator.allocate("PROP-1", quantity).unwrap_err();
    assert!(matches!(err, LabelError::InvalidQuantity(q) if q == quantity));
    assert_eq!(allocator.store().counter().unwrap(), before);
}

// =============================================================================
// Serial formatting
// =============================================================================

/// Property: formatting pads to at least `digits`, never truncates, and
/// parses back to the same number.
pub fn prop_format_serial_round_trips(number: u64, digits: usize) {
    let formatted = format_serial(number, digits);
    assert!(formatted.len() >= digits);
    assert!(formatted.len() >= number.to_string().len());
    assert!(formatted.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(formatted.parse::<u64>().unwrap(), number);
}

// =============================================================================
// Scan parsing
// =============================================================================

/// Property: well-formed alternating scan text yields one pair per
/// part/quantity, in order, with validity matching the quantity sign.
pub fn prop_scan_pairs_follow_input(pairs: &[(String, i64)]) {
    let text: String = pairs
        .iter()
        .map(|(part, q)| format!("{}\n{}\n", part, q))
        .collect();

    let parsed = parse_scan_input(&text).expect("even line count should parse");
    assert_eq!(parsed.len(), pairs.len());
    for (pair, (part, q)) in parsed.iter().zip(pairs) {
        assert_eq!(&pair.part_number, part);
        assert_eq!(pair.quantity, Some(*q));
        assert_eq!(pair.valid, *q > 0);
        assert_eq!(pair.error.is_none(), pair.valid);
    }
}

fn arb_part_number() -> impl Strategy<Value = String> {
    "[0-9]{3}-[0-9]{4}"
}

fn arb_pairs(max: usize) -> impl Strategy<Value = Vec<(String, i64)>> {
    prop::collection::vec((arb_part_number(), -5i64..50), 0..max)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use labelgen::service::{CounterDefaults, CounterStore};
    use labelgen::storage::RocksDbStore;
    use tempfile::TempDir;

    fn create_allocator() -> (Allocator<RocksDbStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
        let counters = CounterStore::new(store, CounterDefaults::default());
        (Allocator::new(counters), dir)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_allocation_is_contiguous(quantities in prop::collection::vec(1i64..40, 1..8)) {
            let (allocator, _dir) = create_allocator();
            prop_allocation_is_contiguous(&allocator, &quantities);
        }

        #[test]
        fn test_invalid_quantity_changes_nothing(
            warmup in 0i64..5,
            quantity in i64::MIN..=0
        ) {
            let (allocator, _dir) = create_allocator();
            if warmup > 0 {
                allocator.allocate("PROP-0", warmup).unwrap();
            }
            prop_invalid_quantity_changes_nothing(&allocator, quantity);
        }

        #[test]
        fn test_format_serial_round_trips(number in any::<u64>(), digits in 1usize..=20) {
            prop_format_serial_round_trips(number, digits);
        }

        #[test]
        fn test_scan_pairs_follow_input(pairs in arb_pairs(12)) {
            prop_scan_pairs_follow_input(&pairs);
        }

        #[test]
        fn test_odd_line_count_is_malformed(
            lines in prop::collection::vec("[a-z0-9-]{1,8}", 0..10)
        ) {
            let mut lines = lines;
            if lines.len() % 2 == 0 {
                lines.push("x".into());
            }
            let result = parse_scan_input(&lines.join("\n"));
            prop_assert!(matches!(result, Err(LabelError::MalformedInput(_))));
        }
    }

    #[test]
    fn test_known_format_values() {
        assert_eq!(format_serial(500, 6), "000500");
        assert_eq!(format_serial(1_000_000, 6), "1000000");
    }
}
