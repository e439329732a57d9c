pub mod allocator;
pub mod batch;
pub mod catalog;
pub mod counter;
pub mod label;
pub mod scan;

pub use allocator::{validate_part_number, validate_quantity, Allocation, Allocator, MAX_QUANTITY};
pub use batch::{BatchCoordinator, BatchResult, PairOutcome};
pub use catalog::{
    csv_template, parse_upc_csv, CsvImport, ImportSummary, PartCatalog, PartSummary, UpcRow,
};
pub use counter::{
    format_serial, validate_serial_digits, CounterDefaults, CounterStore, MAX_SERIAL_DIGITS,
};
pub use label::{render_label, LabelData};
pub use scan::{parse_scan_input, validate_pair, ScanPair};
