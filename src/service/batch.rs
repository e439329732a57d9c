use serde::Serialize;

use crate::contracts::{InventoryStore, LabelError};
use crate::service::allocator::Allocator;
use crate::service::scan::ScanPair;

/// Result for one pair of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Issued {
        part_number: String,
        quantity: u64,
        serial_range: String,
        serials: Vec<String>,
        upc: Option<String>,
    },
    Failed {
        part_number: String,
        quantity: Option<i64>,
        error: String,
    },
}

impl PairOutcome {
    pub fn is_issued(&self) -> bool {
        matches!(self, PairOutcome::Issued { .. })
    }
}

/// Per-pair outcomes in input order, plus totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub results: Vec<PairOutcome>,
    pub total_serials_issued: u64,
    pub success_count: usize,
    pub error_count: usize,
}

impl BatchResult {
    fn push(&mut self, outcome: PairOutcome) {
        match &outcome {
            PairOutcome::Issued { quantity, .. } => {
                self.total_serials_issued += quantity;
                self.success_count += 1;
            }
            PairOutcome::Failed { .. } => self.error_count += 1,
        }
        self.results.push(outcome);
    }
}

/// Runs one allocation per valid pair, sequentially.
///
/// Each allocation commits on its own; the batch as a whole is not atomic.
pub struct BatchCoordinator<S: InventoryStore> {
    allocator: Allocator<S>,
}

impl<S: InventoryStore> Clone for BatchCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            allocator: self.allocator.clone(),
        }
    }
}

impl<S: InventoryStore> BatchCoordinator<S> {
    pub fn new(allocator: Allocator<S>) -> Self {
        Self { allocator }
    }

    /// Processes pairs in order.
    ///
    /// Invalid pairs and expected allocation failures are recorded and the
    /// batch continues. An unexpected fault (see [`LabelError::is_expected`])
    /// stops the batch and is returned; pairs already issued stay issued.
    pub fn process_batch(&self, pairs: &[ScanPair]) -> Result<BatchResult, LabelError> {
        let mut result = BatchResult::default();

        for pair in pairs {
            if !pair.valid {
                result.push(PairOutcome::Failed {
                    part_number: pair.part_number.clone(),
                    quantity: pair.quantity,
                    error: pair
                        .error
                        .clone()
                        .unwrap_or_else(|| "Invalid input".to_string()),
                });
                continue;
            }

            let quantity = pair.quantity.unwrap_or(0);
            match self.allocator.allocate(&pair.part_number, quantity) {
                Ok(allocation) => result.push(PairOutcome::Issued {
                    part_number: allocation.part.part_number.clone(),
                    quantity: allocation.quantity,
                    serial_range: allocation.range(),
                    serials: allocation.serials,
                    upc: allocation.upc,
                }),
                Err(e) if e.is_expected() => {
                    tracing::warn!(
                        part_number = %pair.part_number,
                        quantity,
                        error = %e,
                        "Batch pair failed"
                    );
                    result.push(PairOutcome::Failed {
                        part_number: pair.part_number.clone(),
                        quantity: pair.quantity,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!(
                        part_number = %pair.part_number,
                        issued_so_far = result.success_count,
                        error = %e,
                        "Batch aborted by internal fault"
                    );
                    return Err(e);
                }
            }
        }

        tracing::info!(
            pairs = pairs.len(),
            success_count = result.success_count,
            error_count = result.error_count,
            total_serials_issued = result.total_serials_issued,
            "Processed batch"
        );

        Ok(result)
    }
}
