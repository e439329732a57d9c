use std::sync::Arc;

use serde::Serialize;

use crate::contracts::{InventoryStore, LabelError, Part, SerialRecord, WriteTxn};
use crate::service::counter::{format_serial, CounterStore};

/// A contiguous block of serials issued for one part.
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    /// Formatted serials in allocation order.
    pub serials: Vec<String>,
    pub first: String,
    pub last: String,
    pub part: Part,
    /// UPC copied onto every record in this block.
    pub upc: Option<String>,
    pub quantity: u64,
}

impl Allocation {
    /// "first-last", the way ranges are shown to operators.
    pub fn range(&self) -> String {
        format!("{}-{}", self.first, self.last)
    }
}

/// Issues gap-free, collision-free blocks of serial numbers.
pub struct Allocator<S: InventoryStore> {
    counters: CounterStore<S>,
}

impl<S: InventoryStore> Clone for Allocator<S> {
    fn clone(&self) -> Self {
        Self {
            counters: self.counters.clone(),
        }
    }
}

/// Largest block a single allocation may request.
pub const MAX_QUANTITY: u64 = 100_000;

/// Checks a requested quantity is a positive integer no larger than
/// [`MAX_QUANTITY`].
pub fn validate_quantity(quantity: i64) -> Result<u64, LabelError> {
    u64::try_from(quantity)
        .ok()
        .filter(|q| (1..=MAX_QUANTITY).contains(q))
        .ok_or(LabelError::InvalidQuantity(quantity))
}

/// Returns the trimmed part number, rejecting empty input.
pub fn validate_part_number(part_number: &str) -> Result<&str, LabelError> {
    let trimmed = part_number.trim();
    if trimmed.is_empty() {
        return Err(LabelError::InvalidPartNumber);
    }
    Ok(trimmed)
}

impl<S: InventoryStore> Allocator<S> {
    pub fn new(counters: CounterStore<S>) -> Self {
        Self { counters }
    }

    pub fn store(&self) -> &Arc<S> {
        self.counters.store()
    }

    /// Allocates `quantity` consecutive serials for `part_number`.
    ///
    /// The counter read, part lookup, record inserts and counter advance
    /// happen under one exclusive transaction and commit together. On any
    /// error nothing is written and the counter keeps its value.
    pub fn allocate(&self, part_number: &str, quantity: i64) -> Result<Allocation, LabelError> {
        let quantity = validate_quantity(quantity)?;
        let part_number = validate_part_number(part_number)?;

        let mut txn = self.store().begin()?;

        let mut counter = match txn.counter() {
            Some(counter) => counter.clone(),
            None => self.counters.defaults().counter(),
        };
        let start = counter.current_serial;
        let digits = counter.serial_digits;
        let next = start
            .checked_add(quantity)
            .ok_or(LabelError::SerialOverflow { start, quantity })?;

        let part = match txn.part(part_number)? {
            Some(part) => part,
            None => {
                let part = Part::new(part_number);
                txn.put_part(&part)?;
                tracing::debug!(part_number = %part_number, "Created part on first allocation");
                part
            }
        };

        // One snapshot for the whole block.
        let upc = part.upc.clone();
        let created_at_ms = chrono::Utc::now().timestamp_millis();

        let mut serials = Vec::with_capacity(quantity as usize);
        for value in start..next {
            let serial_number = format_serial(value, digits);
            txn.insert_serial(&SerialRecord {
                serial_number: serial_number.clone(),
                part_number: part.part_number.clone(),
                upc: upc.clone(),
                created_at_ms,
            })?;
            serials.push(serial_number);
        }

        counter.current_serial = next;
        txn.put_counter(counter)?;
        txn.commit()?;

        // quantity >= 1, so the block has a first and last serial.
        let first = format_serial(start, digits);
        let last = format_serial(next - 1, digits);

        tracing::info!(
            part_number = %part.part_number,
            quantity,
            first = %first,
            last = %last,
            "Allocated serial block"
        );

        Ok(Allocation {
            serials,
            first,
            last,
            part,
            upc,
            quantity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{CounterSettings, StorageError};
    use crate::service::counter::CounterDefaults;
    use crate::storage::RocksDbStore;
    use tempfile::TempDir;

    fn create_allocator() -> (Allocator<RocksDbStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksDbStore::open(dir.path()).unwrap());
        let counters = CounterStore::new(store, CounterDefaults::default());
        (Allocator::new(counters), dir)
    }

    fn current_serial(allocator: &Allocator<RocksDbStore>) -> u64 {
        allocator.counters.get_or_init().unwrap().current_serial
    }

    #[test]
    fn allocates_contiguous_block_from_counter() {
        let (allocator, _dir) = create_allocator();

        let allocation = allocator.allocate("232-9983", 3).unwrap();
        assert_eq!(allocation.serials, vec!["000500", "000501", "000502"]);
        assert_eq!(allocation.first, "000500");
        assert_eq!(allocation.last, "000502");
        assert_eq!(allocation.range(), "000500-000502");
        assert_eq!(allocation.quantity, 3);
        assert_eq!(current_serial(&allocator), 503);
    }

    #[test]
    fn consecutive_allocations_continue_the_sequence() {
        let (allocator, _dir) = create_allocator();

        allocator.allocate("232-9983", 12).unwrap();
        let second = allocator.allocate("243-0012", 1).unwrap();
        assert_eq!(second.serials, vec!["000512"]);
        assert_eq!(current_serial(&allocator), 513);
    }

    #[test]
    fn records_are_persisted_with_part_and_upc() {
        let (allocator, _dir) = create_allocator();
        let store = Arc::clone(allocator.store());

        let mut txn = store.begin().unwrap();
        txn.put_part(&Part {
            part_number: "232-9983".into(),
            upc: Some("012345678901".into()),
        })
        .unwrap();
        txn.commit().unwrap();

        let allocation = allocator.allocate("232-9983", 2).unwrap();
        assert_eq!(allocation.upc.as_deref(), Some("012345678901"));

        for serial in &allocation.serials {
            let record = store.get_serial(serial).unwrap().unwrap();
            assert_eq!(record.part_number, "232-9983");
            assert_eq!(record.upc.as_deref(), Some("012345678901"));
        }
        assert_eq!(
            store.serials_for_part("232-9983").unwrap(),
            allocation.serials
        );
    }

    #[test]
    fn unknown_part_is_created_without_upc() {
        let (allocator, _dir) = create_allocator();

        let allocation = allocator.allocate("999-0001", 1).unwrap();
        assert_eq!(allocation.part, Part::new("999-0001"));
        assert!(allocation.upc.is_none());
        assert_eq!(
            allocator.store().get_part("999-0001").unwrap(),
            Some(Part::new("999-0001"))
        );
    }

    #[test]
    fn part_number_is_trimmed() {
        let (allocator, _dir) = create_allocator();
        let allocation = allocator.allocate("  232-9983 ", 1).unwrap();
        assert_eq!(allocation.part.part_number, "232-9983");
    }

    #[test]
    fn zero_and_negative_quantities_leave_counter_unchanged() {
        let (allocator, _dir) = create_allocator();
        let before = current_serial(&allocator);

        for quantity in [0, -1, i64::MIN] {
            let err = allocator.allocate("232-9983", quantity).unwrap_err();
            assert!(matches!(err, LabelError::InvalidQuantity(q) if q == quantity));
        }
        assert_eq!(current_serial(&allocator), before);
        assert!(allocator.store().get_part("232-9983").unwrap().is_none());
    }

    #[test]
    fn quantity_above_limit_leaves_counter_unchanged() {
        let (allocator, _dir) = create_allocator();
        allocator.allocate("232-9983", 2).unwrap();
        let before = current_serial(&allocator);

        let quantity = MAX_QUANTITY as i64 + 1;
        let err = allocator.allocate("232-9983", quantity).unwrap_err();
        assert!(matches!(err, LabelError::InvalidQuantity(q) if q == quantity));
        assert_eq!(err.to_string(), format!("Invalid quantity: {}", quantity));
        assert_eq!(current_serial(&allocator), before);
        assert_eq!(allocator.store().serials_for_part("232-9983").unwrap().len(), 2);
    }

    #[test]
    fn empty_part_number_is_rejected() {
        let (allocator, _dir) = create_allocator();
        assert!(matches!(
            allocator.allocate("   ", 1),
            Err(LabelError::InvalidPartNumber)
        ));
    }

    #[test]
    fn collision_rolls_back_whole_block() {
        let (allocator, _dir) = create_allocator();
        allocator.allocate("232-9983", 5).unwrap(); // 500..=504

        // Move the counter back so the next block overlaps 503 and 504.
        allocator
            .counters
            .update_settings(&CounterSettings {
                serial_digits: None,
                current_serial: Some(503),
            })
            .unwrap();

        let err = allocator.allocate("243-0012", 4).unwrap_err();
        assert!(matches!(
            err,
            LabelError::Storage(StorageError::DuplicateSerial(ref s)) if s == "000503"
        ));

        // Nothing from the failed block was written.
        assert_eq!(current_serial(&allocator), 503);
        assert!(allocator.store().get_part("243-0012").unwrap().is_none());
        assert!(allocator.store().get_serial("000505").unwrap().is_none());
        assert_eq!(
            allocator.store().get_serial("000503").unwrap().unwrap().part_number,
            "232-9983"
        );
    }

    #[test]
    fn overflow_is_reported_without_writing() {
        let (allocator, _dir) = create_allocator();
        allocator
            .counters
            .update_settings(&CounterSettings {
                serial_digits: None,
                current_serial: Some(u64::MAX - 1),
            })
            .unwrap();

        let err = allocator.allocate("232-9983", 2).unwrap_err();
        assert!(matches!(err, LabelError::SerialOverflow { quantity: 2, .. }));
        assert_eq!(current_serial(&allocator), u64::MAX - 1);

        // Exactly reaching u64::MAX is fine.
        let allocation = allocator.allocate("232-9983", 1).unwrap();
        assert_eq!(allocation.first, (u64::MAX - 1).to_string());
    }

    #[test]
    fn first_allocation_initializes_counter() {
        let (allocator, _dir) = create_allocator();
        assert!(allocator.store().counter().unwrap().is_none());

        allocator.allocate("232-9983", 1).unwrap();
        let counter = allocator.store().counter().unwrap().unwrap();
        assert_eq!(counter.current_serial, 501);
    }

    #[test]
    fn digit_count_applies_to_new_blocks() {
        let (allocator, _dir) = create_allocator();
        allocator
            .counters
            .update_settings(&CounterSettings {
                serial_digits: Some(8),
                current_serial: None,
            })
            .unwrap();

        let allocation = allocator.allocate("232-9983", 1).unwrap();
        assert_eq!(allocation.first, "00000500");
    }

    #[test]
    fn validate_quantity_accepts_positive_only() {
        assert_eq!(validate_quantity(1).unwrap(), 1);
        assert_eq!(validate_quantity(MAX_QUANTITY as i64).unwrap(), MAX_QUANTITY);
        assert!(validate_quantity(MAX_QUANTITY as i64 + 1).is_err());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-5).is_err());
    }
}
