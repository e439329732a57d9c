use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

/// Domain errors surfaced by the allocation core and the part catalog.
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Invalid part number format")]
    InvalidPartNumber,

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Only one configuration record is allowed")]
    InitializationConflict,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Part {0} is referenced by existing serial numbers")]
    PartInUse(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Serial counter overflow: {start} + {quantity} exceeds u64")]
    SerialOverflow { start: u64, quantity: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LabelError {
    /// Returns true for failures that belong to a single request and may be
    /// reported per batch pair. Corrupt data and poisoned locks return false.
    pub fn is_expected(&self) -> bool {
        match self {
            LabelError::Storage(e) => e.is_expected(),
            _ => true,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Serial number {0} already exists")]
    DuplicateSerial(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StorageError {
    /// I/O failures and key collisions abort one transaction; the rest
    /// indicate the store itself is in a bad state.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            StorageError::RocksDb(_) | StorageError::DuplicateSerial(_)
        )
    }
}

/// Extension trait for converting lock errors to StorageError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a StorageError.
    fn map_lock_err(self) -> Result<T, StorageError>;
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}
