//! Concurrency tests for serial allocation.
//!
//! These tests verify that concurrent allocations never overlap and never
//! leave gaps. Run with: cargo test --test concurrency_tests

use std::sync::{Arc, Barrier};
use std::thread;

use labelgen::contracts::{InventoryStore, LabelError};
use labelgen::service::{
    Allocation, Allocator, BatchCoordinator, CounterDefaults, CounterStore, PartCatalog, ScanPair,
};
use labelgen::storage::RocksDbStore;
use tempfile::TempDir;

fn create_allocator() -> (Allocator<RocksDbStore>, Arc<RocksDbStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let counters = CounterStore::new(Arc::clone(&store), CounterDefaults::default());
    (Allocator::new(counters), store, dir)
}

fn numeric(serial: &str) -> u64 {
    serial.parse().expect("serials are decimal")
}

// =============================================================================
// Parallel Allocation Tests
// =============================================================================

/// Concurrent allocations produce disjoint contiguous ranges that together
/// cover exactly [start, start + total).
#[test]
fn parallel_allocations_are_disjoint_and_gap_free() {
    let (allocator, store, _dir) = create_allocator();
    let start = 500u64;
    let num_threads = 8;
    let allocations_per_thread = 25;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let allocator = allocator.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut allocations = Vec::with_capacity(allocations_per_thread);
                for i in 0..allocations_per_thread {
                    // Vary block sizes so ranges interleave unevenly.
                    let quantity = ((t + i) % 5 + 1) as i64;
                    let part = format!("P-{}", t % 3);
                    allocations.push(
                        allocator
                            .allocate(&part, quantity)
                            .expect("allocation should succeed"),
                    );
                }
                allocations
            })
        })
        .collect();

    let mut allocations: Vec<Allocation> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let total: u64 = allocations.iter().map(|a| a.quantity).sum();

    // Each block is internally contiguous.
    for a in &allocations {
        let first = numeric(&a.first);
        let expected: Vec<u64> = (first..first + a.quantity).collect();
        let actual: Vec<u64> = a.serials.iter().map(|s| numeric(s)).collect();
        assert_eq!(actual, expected);
    }

    // Sorted by first serial, blocks tile the range with no gaps or overlap.
    allocations.sort_by_key(|a| numeric(&a.first));
    let mut next = start;
    for a in &allocations {
        assert_eq!(numeric(&a.first), next, "gap or overlap before {}", a.first);
        next = numeric(&a.last) + 1;
    }
    assert_eq!(next, start + total);

    let counter = store.counter().unwrap().unwrap();
    assert_eq!(counter.current_serial, start + total);
}

/// Every allocated serial is persisted exactly once.
#[test]
fn parallel_allocations_persist_every_serial() {
    let (allocator, store, _dir) = create_allocator();
    let num_threads = 6;
    let per_thread = 10;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let allocator = allocator.clone();
            thread::spawn(move || {
                (0..per_thread)
                    .flat_map(|_| {
                        allocator
                            .allocate(&format!("PART-{}", t), 2)
                            .unwrap()
                            .serials
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut serials: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let count = serials.len();
    serials.sort();
    serials.dedup();
    assert_eq!(serials.len(), count, "Found duplicate serials");
    assert_eq!(count, num_threads * per_thread * 2);

    for t in 0..num_threads {
        let part_serials = store.serials_for_part(&format!("PART-{}", t)).unwrap();
        assert_eq!(part_serials.len(), per_thread * 2);
        for serial in &part_serials {
            let record = store.get_serial(serial).unwrap().unwrap();
            assert_eq!(record.part_number, format!("PART-{}", t));
        }
    }
}

/// Concurrent batches interleave per pair but never collide.
#[test]
fn concurrent_batches_do_not_collide() {
    let (allocator, store, _dir) = create_allocator();
    let coordinator = BatchCoordinator::new(allocator);
    let num_threads = 4;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let coordinator = coordinator.clone();
            thread::spawn(move || {
                let pairs = vec![
                    ScanPair::valid(format!("A-{}", t), 3),
                    ScanPair::invalid("", Some(1), "Invalid part number format"),
                    ScanPair::valid(format!("B-{}", t), 4),
                ];
                coordinator.process_batch(&pairs).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for result in &results {
        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.total_serials_issued, 7);
    }

    let counter = store.counter().unwrap().unwrap();
    assert_eq!(counter.current_serial, 500 + 7 * num_threads as u64);
}

/// Racing first-time initializations settle on one counter.
#[test]
fn concurrent_get_or_init_creates_one_counter() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let counters = CounterStore::new(
                Arc::clone(&store),
                CounterDefaults {
                    serial_start: 1000 + i,
                    serial_digits: 6,
                },
            );
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                counters.get_or_init().unwrap()
            })
        })
        .collect();

    let counters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let first = &counters[0];
    assert!(counters.iter().all(|c| c == first));
}

/// Exactly one explicit initialization wins.
#[test]
fn concurrent_init_counter_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
    let counters = CounterStore::new(store, CounterDefaults::default());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let counters = counters.clone();
            thread::spawn(move || {
                counters.init_counter(labelgen::contracts::Counter::new(100 * (i + 1), 6))
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LabelError::InitializationConflict)));
}

/// UPC edits racing allocations: every record carries one of the UPCs that
/// was current while it was allocated, never a mix within a block.
#[test]
fn upc_updates_race_allocations_without_mixing_blocks() {
    let (allocator, store, _dir) = create_allocator();
    let catalog = PartCatalog::new(Arc::clone(&store));
    catalog.set_upc("232-9983", Some("000000000000")).unwrap();

    let writer = {
        let catalog = catalog.clone();
        thread::spawn(move || {
            for i in 1..=50u64 {
                catalog
                    .set_upc("232-9983", Some(&format!("{:012}", i)))
                    .unwrap();
            }
        })
    };

    let allocations: Vec<Allocation> = (0..50)
        .map(|_| allocator.allocate("232-9983", 3).unwrap())
        .collect();
    writer.join().unwrap();

    for a in &allocations {
        for serial in &a.serials {
            let record = store.get_serial(serial).unwrap().unwrap();
            assert_eq!(record.upc, a.upc, "block {} has mixed UPCs", a.range());
        }
    }
}
