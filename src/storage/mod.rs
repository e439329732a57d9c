mod rocksdb;

pub use rocksdb::{RocksDbStore, RocksDbTxn, StoreOptions};
