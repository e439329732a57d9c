//! Serial number allocation for inventory labeling.
//!
//! Issues gap-free, collision-free blocks of zero-padded serial numbers per
//! part, records each serial with a snapshot of the part's UPC, and serves
//! the result over HTTP.

pub mod api;
pub mod contracts;
pub mod metrics;
pub mod service;
pub mod storage;
