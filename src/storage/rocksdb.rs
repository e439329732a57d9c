use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rocksdb::{Direction, IteratorMode, Options, ReadOptions, WriteBatch, WriteOptions, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::contracts::{
    Counter, InventoryStore, LockResultExt, Part, SerialRecord, StorageError, WriteTxn,
};

/// Key of the singleton counter record
const COUNTER_KEY: &str = "cfg:counter";
/// Key prefix for parts
const PART_PREFIX: &str = "part";
/// Key prefix for serial records
const SERIAL_PREFIX: &str = "sn";
/// Key prefix for the part -> serial index
const PART_INDEX_PREFIX: &str = "pidx";
/// Separates part number from serial in index keys. Never appears in a
/// formatted serial, so a part's index range cannot bleed into another's.
const PART_INDEX_SEPARATOR: char = '\0';

/// Options for opening a [`RocksDbStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// fsync the WAL on every commit. Off trades crash durability of the
    /// last few commits for throughput.
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { sync_writes: true }
    }
}

impl StoreOptions {
    /// Reads `LABELGEN_SYNC_WRITES` (default: true).
    pub fn from_env() -> Self {
        let sync_writes = std::env::var("LABELGEN_SYNC_WRITES")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(Self::default().sync_writes);
        Self { sync_writes }
    }
}

/// RocksDB-backed inventory store.
///
/// Writers serialize on `write_lock`; each transaction commits as a single
/// `WriteBatch`, so a crash never leaves a half-applied allocation.
pub struct RocksDbStore {
    db: DB,
    write_lock: Mutex<()>,
    options: StoreOptions,
}

impl RocksDbStore {
    /// Opens or creates a store at the given path with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_options(path, StoreOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path).map_err(|e| StorageError::RocksDb(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            sync_writes = options.sync_writes,
            "Opened inventory store"
        );

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            options,
        })
    }

    fn part_key(part_number: &str) -> String {
        format!("{}:{}", PART_PREFIX, part_number)
    }

    fn serial_key(serial_number: &str) -> String {
        format!("{}:{}", SERIAL_PREFIX, serial_number)
    }

    fn part_index_prefix(part_number: &str) -> String {
        format!(
            "{}:{}{}",
            PART_INDEX_PREFIX, part_number, PART_INDEX_SEPARATOR
        )
    }

    fn part_index_key(part_number: &str, serial_number: &str) -> String {
        format!("{}{}", Self::part_index_prefix(part_number), serial_number)
    }

    /// A part number may itself contain the separator, so "A" scans past keys
    /// of "A\0B". Those suffixes still contain a separator; a serial never does.
    fn is_own_index_suffix(suffix: &[u8]) -> bool {
        !suffix.contains(&(PART_INDEX_SEPARATOR as u8))
    }

    /// Smallest key greater than every key starting with `prefix`.
    /// All prefixes used here end in an ASCII byte, so incrementing it is safe.
    fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
        let mut bound = prefix.to_vec();
        if let Some(last) = bound.last_mut() {
            *last += 1;
        }
        bound
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.get(key.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::decode(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::RocksDb(e.to_string())),
        }
    }

    fn key_exists(&self, key: &str) -> Result<bool, StorageError> {
        self.db
            .get_pinned(key.as_bytes())
            .map(|v| v.is_some())
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }

    /// Visits every key/value under `prefix` in key order until `f` returns false.
    fn scan_prefix<F>(&self, prefix: &str, mut f: F) -> Result<(), StorageError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, StorageError>,
    {
        let prefix_bytes = prefix.as_bytes();
        let mut read_opts = ReadOptions::default();
        read_opts.set_iterate_upper_bound(Self::prefix_upper_bound(prefix_bytes));

        let iter = self.db.iterator_opt(
            IteratorMode::From(prefix_bytes, Direction::Forward),
            read_opts,
        );

        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::RocksDb(e.to_string()))?;
            if !key.starts_with(prefix_bytes) {
                break;
            }
            if !f(&key[prefix_bytes.len()..], &value)? {
                break;
            }
        }
        Ok(())
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.options.sync_writes);
        opts
    }
}

impl InventoryStore for RocksDbStore {
    type Txn<'a> = RocksDbTxn<'a>;

    fn begin(&self) -> Result<RocksDbTxn<'_>, StorageError> {
        let guard = self.write_lock.lock().map_lock_err()?;
        // Read under the lock so no other writer can have moved it since.
        let counter = self.get_value::<Counter>(COUNTER_KEY)?;
        Ok(RocksDbTxn {
            store: self,
            _guard: guard,
            counter,
            batch: WriteBatch::default(),
            staged_parts: HashMap::new(),
            staged_serials: HashSet::new(),
            staged_part_refs: HashSet::new(),
        })
    }

    fn counter(&self) -> Result<Option<Counter>, StorageError> {
        self.get_value(COUNTER_KEY)
    }

    fn get_part(&self, part_number: &str) -> Result<Option<Part>, StorageError> {
        self.get_value(&Self::part_key(part_number))
    }

    fn list_parts(&self) -> Result<Vec<Part>, StorageError> {
        let mut parts = Vec::new();
        self.scan_prefix(&format!("{}:", PART_PREFIX), |_, value| {
            parts.push(Self::decode::<Part>(value)?);
            Ok(true)
        })?;
        Ok(parts)
    }

    fn get_serial(&self, serial_number: &str) -> Result<Option<SerialRecord>, StorageError> {
        self.get_value(&Self::serial_key(serial_number))
    }

    fn serials_for_part(&self, part_number: &str) -> Result<Vec<String>, StorageError> {
        let mut serials = Vec::new();
        self.scan_prefix(&Self::part_index_prefix(part_number), |suffix, _| {
            if !Self::is_own_index_suffix(suffix) {
                return Ok(true);
            }
            serials.push(String::from_utf8_lossy(suffix).into_owned());
            Ok(true)
        })?;
        // Key order is lexicographic; widen-aware numeric order is what callers expect.
        serials.sort_by_key(|s| (s.parse::<u64>().ok(), s.clone()));
        Ok(serials)
    }
}

/// Exclusive write transaction over a [`RocksDbStore`].
///
/// Holds the store's write lock until committed or dropped.
pub struct RocksDbTxn<'a> {
    store: &'a RocksDbStore,
    _guard: MutexGuard<'a, ()>,
    counter: Option<Counter>,
    batch: WriteBatch,
    /// Parts written (`Some`) or deleted (`None`) in this transaction
    staged_parts: HashMap<String, Option<Part>>,
    staged_serials: HashSet<String>,
    /// Parts that gained a serial in this transaction
    staged_part_refs: HashSet<String>,
}

impl WriteTxn for RocksDbTxn<'_> {
    fn counter(&self) -> Option<&Counter> {
        self.counter.as_ref()
    }

    fn put_counter(&mut self, counter: Counter) -> Result<(), StorageError> {
        self.batch
            .put(COUNTER_KEY.as_bytes(), RocksDbStore::encode(&counter)?);
        self.counter = Some(counter);
        Ok(())
    }

    fn part(&self, part_number: &str) -> Result<Option<Part>, StorageError> {
        if let Some(staged) = self.staged_parts.get(part_number) {
            return Ok(staged.clone());
        }
        self.store.get_part(part_number)
    }

    fn put_part(&mut self, part: &Part) -> Result<(), StorageError> {
        let key = RocksDbStore::part_key(&part.part_number);
        self.batch.put(key.as_bytes(), RocksDbStore::encode(part)?);
        self.staged_parts
            .insert(part.part_number.clone(), Some(part.clone()));
        Ok(())
    }

    fn delete_part(&mut self, part_number: &str) -> Result<(), StorageError> {
        let key = RocksDbStore::part_key(part_number);
        self.batch.delete(key.as_bytes());
        self.staged_parts.insert(part_number.to_string(), None);
        Ok(())
    }

    fn part_has_serials(&self, part_number: &str) -> Result<bool, StorageError> {
        if self.staged_part_refs.contains(part_number) {
            return Ok(true);
        }
        let mut found = false;
        self.store
            .scan_prefix(&RocksDbStore::part_index_prefix(part_number), |suffix, _| {
                found = RocksDbStore::is_own_index_suffix(suffix);
                Ok(!found)
            })?;
        Ok(found)
    }

    fn insert_serial(&mut self, record: &SerialRecord) -> Result<(), StorageError> {
        let key = RocksDbStore::serial_key(&record.serial_number);
        if self.staged_serials.contains(&record.serial_number) || self.store.key_exists(&key)? {
            return Err(StorageError::DuplicateSerial(record.serial_number.clone()));
        }

        self.batch.put(key.as_bytes(), RocksDbStore::encode(record)?);
        let index_key = RocksDbStore::part_index_key(&record.part_number, &record.serial_number);
        self.batch.put(index_key.as_bytes(), b"");

        self.staged_serials.insert(record.serial_number.clone());
        self.staged_part_refs.insert(record.part_number.clone());
        Ok(())
    }

    fn commit(self) -> Result<(), StorageError> {
        let write_opts = self.store.write_options();
        // Lock is released when `self` drops after the write lands.
        self.store
            .db
            .write_opt(self.batch, &write_opts)
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }
}
