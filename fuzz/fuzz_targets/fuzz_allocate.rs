#![no_main]

use std::sync::Arc;

use labelgen::contracts::InventoryStore;
use labelgen::service::{Allocator, CounterDefaults, CounterStore};
use labelgen::storage::RocksDbStore;
use libfuzzer_sys::fuzz_target;
use tempfile::TempDir;

fuzz_target!(|data: &[u8]| {
    // Fuzz part numbers with arbitrary strings, including separators and
    // unicode, and check the counter only moves on success.
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let allocator = Allocator::new(CounterStore::new(
        Arc::clone(&store),
        CounterDefaults::default(),
    ));

    let part = String::from_utf8_lossy(data);
    let quantity = data.first().map(|b| *b as i64 - 8).unwrap_or(1);

    match allocator.allocate(&part, quantity) {
        Ok(allocation) => {
            let counter = store.counter().unwrap().unwrap();
            assert_eq!(counter.current_serial, 500 + allocation.quantity);
            assert_eq!(
                store.serials_for_part(part.trim()).unwrap(),
                allocation.serials
            );
        }
        Err(_) => {
            assert!(store.counter().unwrap().is_none());
        }
    }
});
