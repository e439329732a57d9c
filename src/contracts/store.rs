use crate::contracts::error::StorageError;
use crate::contracts::model::{Counter, Part, SerialRecord};

/// Persistent inventory state: the counter, parts and issued serials.
///
/// # Invariants
/// - At most one `Counter` exists.
/// - Every mutation goes through a [`WriteTxn`], and at most one `WriteTxn`
///   is live at a time. Holding one is holding exclusive access to the
///   counter.
/// - A `WriteTxn` becomes visible only on `commit`; dropping it discards
///   every staged write.
/// - Plain reads take no lock and see only committed state.
pub trait InventoryStore: Send + Sync {
    type Txn<'a>: WriteTxn
    where
        Self: 'a;

    /// Acquires exclusive write access, blocking until the current holder
    /// commits or drops its transaction.
    fn begin(&self) -> Result<Self::Txn<'_>, StorageError>;

    /// Reads the committed counter, if initialized.
    fn counter(&self) -> Result<Option<Counter>, StorageError>;

    fn get_part(&self, part_number: &str) -> Result<Option<Part>, StorageError>;

    /// Lists all parts ordered by part number.
    fn list_parts(&self) -> Result<Vec<Part>, StorageError>;

    fn get_serial(&self, serial_number: &str) -> Result<Option<SerialRecord>, StorageError>;

    /// Serial numbers referencing a part, in allocation order.
    fn serials_for_part(&self, part_number: &str) -> Result<Vec<String>, StorageError>;
}

/// An exclusive, all-or-nothing unit of writes.
pub trait WriteTxn {
    /// The counter as of `begin`, including any value staged since.
    fn counter(&self) -> Option<&Counter>;

    fn put_counter(&mut self, counter: Counter) -> Result<(), StorageError>;

    /// Reads a part, seeing writes staged in this transaction.
    fn part(&self, part_number: &str) -> Result<Option<Part>, StorageError>;

    fn put_part(&mut self, part: &Part) -> Result<(), StorageError>;

    fn delete_part(&mut self, part_number: &str) -> Result<(), StorageError>;

    /// Returns true if any committed or staged serial references the part.
    fn part_has_serials(&self, part_number: &str) -> Result<bool, StorageError>;

    /// Stages a new serial record.
    /// Fails with `DuplicateSerial` if the serial number is already taken.
    fn insert_serial(&mut self, record: &SerialRecord) -> Result<(), StorageError>;

    /// Atomically applies every staged write and releases the lock.
    fn commit(self) -> Result<(), StorageError>;
}
