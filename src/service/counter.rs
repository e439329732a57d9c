use std::sync::Arc;

use crate::contracts::{
    Counter, CounterSettings, InventoryStore, LabelError, LabelSettings, WriteTxn,
};

/// Widest accepted `serial_digits`: the decimal width of `u64::MAX`.
pub const MAX_SERIAL_DIGITS: usize = 20;

/// Renders `number` as decimal, zero-padded to at least `digits` characters.
///
/// Values wider than `digits` are never truncated. Widths above
/// [`MAX_SERIAL_DIGITS`] pad to [`MAX_SERIAL_DIGITS`].
pub fn format_serial(number: u64, digits: usize) -> String {
    format!("{:0width$}", number, width = digits.min(MAX_SERIAL_DIGITS))
}

/// Checks a digit count lies in `1..=MAX_SERIAL_DIGITS`.
pub fn validate_serial_digits(digits: usize) -> Result<usize, LabelError> {
    if (1..=MAX_SERIAL_DIGITS).contains(&digits) {
        Ok(digits)
    } else {
        Err(LabelError::InvalidSettings(format!(
            "serial_digits must be between 1 and {}",
            MAX_SERIAL_DIGITS
        )))
    }
}

/// Values used when the counter is first created.
#[derive(Debug, Clone)]
pub struct CounterDefaults {
    pub serial_start: u64,
    pub serial_digits: usize,
}

impl Default for CounterDefaults {
    fn default() -> Self {
        Self {
            serial_start: 500,
            serial_digits: 6,
        }
    }
}

impl CounterDefaults {
    /// Creates defaults from environment variables.
    ///
    /// Reads:
    /// - `LABELGEN_SERIAL_START`: first serial to issue (default: 500)
    /// - `LABELGEN_SERIAL_DIGITS`: zero-padded width (default: 6, 1 to 20)
    pub fn from_env() -> Self {
        let default = Self::default();

        let serial_start = std::env::var("LABELGEN_SERIAL_START")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.serial_start);

        let serial_digits = std::env::var("LABELGEN_SERIAL_DIGITS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .and_then(|d| match validate_serial_digits(d) {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::warn!(value = d, error = %e, "Ignoring LABELGEN_SERIAL_DIGITS");
                    None
                }
            })
            .unwrap_or(default.serial_digits);

        Self {
            serial_start,
            serial_digits,
        }
    }

    pub fn counter(&self) -> Counter {
        Counter::new(self.serial_start, self.serial_digits)
    }
}

/// Access to the singleton allocation counter.
pub struct CounterStore<S: InventoryStore> {
    store: Arc<S>,
    defaults: CounterDefaults,
}

impl<S: InventoryStore> Clone for CounterStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            defaults: self.defaults.clone(),
        }
    }
}

impl<S: InventoryStore> CounterStore<S> {
    pub fn new(store: Arc<S>, defaults: CounterDefaults) -> Self {
        Self { store, defaults }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn defaults(&self) -> &CounterDefaults {
        &self.defaults
    }

    /// Returns the counter, creating it from the defaults if absent.
    pub fn get_or_init(&self) -> Result<Counter, LabelError> {
        if let Some(counter) = self.store.counter()? {
            return Ok(counter);
        }

        let mut txn = self.store.begin()?;
        // Another writer may have created it while we waited for the lock.
        if let Some(counter) = txn.counter() {
            return Ok(counter.clone());
        }
        let counter = self.defaults.counter();
        txn.put_counter(counter.clone())?;
        txn.commit()?;

        tracing::info!(
            serial_start = counter.serial_start,
            serial_digits = counter.serial_digits,
            "Initialized serial counter"
        );
        Ok(counter)
    }

    /// Creates the counter explicitly.
    /// Fails with `InitializationConflict` if one already exists.
    pub fn init_counter(&self, counter: Counter) -> Result<Counter, LabelError> {
        validate_serial_digits(counter.serial_digits)?;

        let mut txn = self.store.begin()?;
        if txn.counter().is_some() {
            return Err(LabelError::InitializationConflict);
        }
        txn.put_counter(counter.clone())?;
        txn.commit()?;
        Ok(counter)
    }

    /// Applies admin changes to the digit count and next serial.
    ///
    /// Runs under the allocation lock, so it lands strictly before or after
    /// any in-flight allocation.
    ///
    /// Duplicate detection compares formatted serials, so `000500` and
    /// `00000500` do not collide. Changing the width and moving the counter
    /// backwards in one update is rejected.
    pub fn update_settings(&self, settings: &CounterSettings) -> Result<Counter, LabelError> {
        if let Some(digits) = settings.serial_digits {
            validate_serial_digits(digits)?;
        }

        let mut txn = self.store.begin()?;
        let mut counter = txn
            .counter()
            .cloned()
            .unwrap_or_else(|| self.defaults.counter());

        if let Some(digits) = settings.serial_digits {
            if digits != counter.serial_digits {
                if settings
                    .current_serial
                    .is_some_and(|next| next < counter.current_serial)
                {
                    return Err(LabelError::InvalidSettings(
                        "cannot change serial_digits and move current_serial backwards together"
                            .into(),
                    ));
                }
                tracing::warn!(
                    from = counter.serial_digits,
                    to = digits,
                    current_serial = counter.current_serial,
                    "Serial width changed; serials below current_serial can no longer be \
                     detected as duplicates"
                );
            }
            counter.serial_digits = digits;
        }
        if let Some(next) = settings.current_serial {
            if next < counter.current_serial {
                tracing::warn!(
                    from = counter.current_serial,
                    to = next,
                    "Serial counter moved backwards; allocations may collide with issued serials"
                );
            }
            counter.current_serial = next;
        }

        txn.put_counter(counter.clone())?;
        txn.commit()?;
        Ok(counter)
    }

    /// Replaces the label template settings.
    pub fn update_labels(&self, labels: LabelSettings) -> Result<Counter, LabelError> {
        labels.validate().map_err(LabelError::InvalidSettings)?;

        let mut txn = self.store.begin()?;
        let mut counter = txn
            .counter()
            .cloned()
            .unwrap_or_else(|| self.defaults.counter());
        counter.labels = labels;
        txn.put_counter(counter.clone())?;
        txn.commit()?;
        Ok(counter)
    }
}
