pub mod error;
pub mod model;
pub mod store;

pub use error::{LabelError, LockResultExt, StorageError};
pub use model::{
    Counter, CounterSettings, LabelSettings, LabelTemplate, Part, SerialRecord, SUPPORTED_DPI,
};
pub use store::{InventoryStore, WriteTxn};
