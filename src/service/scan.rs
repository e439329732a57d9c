use serde::{Deserialize, Serialize};

use crate::contracts::LabelError;

/// A part/quantity pair after validation, ready for the batch coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanPair {
    pub part_number: String,
    /// Parsed quantity; `None` when the raw text was not an integer.
    pub quantity: Option<i64>,
    pub valid: bool,
    pub error: Option<String>,
}

impl ScanPair {
    /// A pair that passed validation.
    pub fn valid(part_number: impl Into<String>, quantity: i64) -> Self {
        Self {
            part_number: part_number.into(),
            quantity: Some(quantity),
            valid: true,
            error: None,
        }
    }

    /// A pair that failed validation with the given reason.
    pub fn invalid(
        part_number: impl Into<String>,
        quantity: Option<i64>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            part_number: part_number.into(),
            quantity,
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Validates one raw part/quantity pair.
///
/// The quantity must be a positive integer and the part number non-empty.
/// When both are wrong the part number error is reported.
pub fn validate_pair(part_number: &str, raw_quantity: &str) -> ScanPair {
    let part_number = part_number.trim();
    let raw_quantity = raw_quantity.trim();

    let quantity = raw_quantity.parse::<i64>().ok();
    let quantity_ok = quantity.is_some_and(|q| q > 0);

    if part_number.is_empty() {
        return ScanPair::invalid(part_number, quantity, LabelError::InvalidPartNumber.to_string());
    }
    match quantity {
        Some(q) if quantity_ok => ScanPair::valid(part_number, q),
        _ => ScanPair::invalid(
            part_number,
            quantity,
            format!("Invalid quantity: {}", raw_quantity),
        ),
    }
}

/// Parses hands-free scanner input: part number and quantity on
/// alternating lines.
///
/// ```text
/// 232-9983
/// 12
/// 243-0012
/// 1
/// ```
///
/// Blank lines are ignored. An odd number of remaining lines is a
/// `MalformedInput` error; bad individual pairs are reported per pair.
pub fn parse_scan_input(input: &str) -> Result<Vec<ScanPair>, LabelError> {
    let lines: Vec<&str> = input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() % 2 != 0 {
        return Err(LabelError::MalformedInput(format!(
            "scan data must have an even number of lines (part/quantity pairs), got {}",
            lines.len()
        )));
    }

    Ok(lines
        .chunks_exact(2)
        .map(|pair| validate_pair(pair[0], pair[1]))
        .collect())
}
