use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::contracts::{InventoryStore, LabelError, Part, SerialRecord, WriteTxn};
use crate::service::allocator::validate_part_number;

/// A part with the number of serials issued against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartSummary {
    #[serde(flatten)]
    pub part: Part,
    pub serial_count: usize,
}

/// One `part,upc` row accepted from an uploaded CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcRow {
    pub part_number: String,
    pub upc: Option<String>,
}

/// Parsed CSV: the rows that can be imported and a message per rejected row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CsvImport {
    pub rows: Vec<UpcRow>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

const HEADER_NAMES: [&str; 3] = ["partnumber", "part_number", "part"];

const CSV_TEMPLATE: &str = "part_number,upc\n232-9983,012345678905\n243-0012,\n";

/// Body of the downloadable import template.
pub fn csv_template() -> &'static str {
    CSV_TEMPLATE
}

/// Splits CSV text into records of cells.
///
/// Double-quoted cells may contain commas and line breaks, and `""` inside
/// quotes is a literal quote. A blank line is a record with no cells.
fn read_csv_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if cell.is_empty() && !quoted => {
                in_quotes = true;
                quoted = true;
            }
            ',' if !in_quotes => {
                record.push(std::mem::take(&mut cell));
                quoted = false;
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                if !record.is_empty() || !cell.is_empty() || quoted {
                    record.push(std::mem::take(&mut cell));
                }
                records.push(std::mem::take(&mut record));
                quoted = false;
            }
            _ => cell.push(c),
        }
    }

    if !record.is_empty() || !cell.is_empty() || quoted {
        record.push(cell);
        records.push(record);
    }
    records
}

/// Parses `part,upc` rows.
///
/// Row numbers in error messages are 1-based and count every record,
/// including a skipped header and blank lines. A first row whose first cell is a known
/// header name is skipped. Extra columns are ignored and an empty UPC cell
/// becomes `None`.
pub fn parse_upc_csv(text: &str) -> CsvImport {
    let mut import = CsvImport::default();

    for (index, cells) in read_csv_records(text).into_iter().enumerate() {
        let row_num = index + 1;

        if row_num == 1
            && cells.len() >= 2
            && HEADER_NAMES.contains(&cells[0].to_lowercase().as_str())
        {
            continue;
        }

        if cells.len() < 2 {
            import.errors.push(format!(
                "Row {}: Invalid format (needs at least 2 columns)",
                row_num
            ));
            continue;
        }

        let part_number = cells[0].trim();
        let upc = cells[1].trim();
        if part_number.is_empty() {
            import
                .errors
                .push(format!("Row {}: Part number is empty", row_num));
            continue;
        }

        import.rows.push(UpcRow {
            part_number: part_number.to_string(),
            upc: (!upc.is_empty()).then(|| upc.to_string()),
        });
    }

    import
}

fn normalize_upc(upc: Option<&str>) -> Option<String> {
    upc.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

/// Part and UPC management plus serial lookup.
pub struct PartCatalog<S: InventoryStore> {
    store: Arc<S>,
}

impl<S: InventoryStore> Clone for PartCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: InventoryStore> PartCatalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get_part(&self, part_number: &str) -> Result<Part, LabelError> {
        let part_number = validate_part_number(part_number)?;
        self.store
            .get_part(part_number)?
            .ok_or_else(|| LabelError::NotFound(format!("part {}", part_number)))
    }

    pub fn list_parts(&self) -> Result<Vec<PartSummary>, LabelError> {
        self.store
            .list_parts()?
            .into_iter()
            .map(|part| {
                let serial_count = self.store.serials_for_part(&part.part_number)?.len();
                Ok(PartSummary { part, serial_count })
            })
            .collect()
    }

    /// Sets or clears a part's UPC, creating the part if needed.
    ///
    /// Serial records already issued keep the UPC they were created with.
    pub fn set_upc(&self, part_number: &str, upc: Option<&str>) -> Result<Part, LabelError> {
        let part_number = validate_part_number(part_number)?;
        let upc = normalize_upc(upc);

        let mut txn = self.store.begin()?;
        let mut part = txn
            .part(part_number)?
            .unwrap_or_else(|| Part::new(part_number));
        part.upc = upc;
        txn.put_part(&part)?;
        txn.commit()?;

        tracing::info!(part_number = %part.part_number, upc = ?part.upc, "Updated UPC");
        Ok(part)
    }

    /// Removes a part that no serial references.
    pub fn delete_part(&self, part_number: &str) -> Result<(), LabelError> {
        let part_number = validate_part_number(part_number)?;

        let mut txn = self.store.begin()?;
        if txn.part(part_number)?.is_none() {
            return Err(LabelError::NotFound(format!("part {}", part_number)));
        }
        if txn.part_has_serials(part_number)? {
            return Err(LabelError::PartInUse(part_number.to_string()));
        }
        txn.delete_part(part_number)?;
        txn.commit()?;

        tracing::info!(part_number = %part_number, "Deleted part");
        Ok(())
    }

    /// Creates or updates every row in one transaction.
    pub fn import_upcs(&self, rows: &[UpcRow]) -> Result<ImportSummary, LabelError> {
        let mut summary = ImportSummary::default();
        if rows.is_empty() {
            return Ok(summary);
        }

        let mut txn = self.store.begin()?;
        for row in rows {
            let part_number = validate_part_number(&row.part_number)?;
            let upc = normalize_upc(row.upc.as_deref());
            let part = match txn.part(part_number)? {
                Some(mut part) => {
                    summary.updated += 1;
                    part.upc = upc;
                    part
                }
                None => {
                    summary.created += 1;
                    Part {
                        part_number: part_number.to_string(),
                        upc,
                    }
                }
            };
            txn.put_part(&part)?;
        }
        txn.commit()?;

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            "Imported UPCs"
        );
        Ok(summary)
    }

    pub fn lookup_serial(&self, serial_number: &str) -> Result<SerialRecord, LabelError> {
        let serial_number = serial_number.trim();
        tracing::debug!(serial_number = %serial_number, "Looking up serial");
        self.store
            .get_serial(serial_number)?
            .ok_or_else(|| LabelError::NotFound(format!("serial {}", serial_number)))
    }

    pub fn serials_for_part(&self, part_number: &str) -> Result<Vec<String>, LabelError> {
        let part_number = validate_part_number(part_number)?;
        Ok(self.store.serials_for_part(part_number)?)
    }
}
