use serde::{Deserialize, Serialize};

/// A part known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// Part number, e.g. "232-9983". Not format-checked beyond non-empty.
    pub part_number: String,
    /// 12-digit UPC, if one has been assigned.
    pub upc: Option<String>,
}

impl Part {
    pub fn new(part_number: impl Into<String>) -> Self {
        Self {
            part_number: part_number.into(),
            upc: None,
        }
    }
}

/// One issued serial number.
///
/// `upc` is copied from the part when the record is created and is never
/// refreshed from the live part afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialRecord {
    pub serial_number: String,
    pub part_number: String,
    pub upc: Option<String>,
    pub created_at_ms: i64,
}

/// The allocation counter and the settings stored alongside it.
///
/// Exactly one of these exists per store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    /// Where numbering started when the store was initialized.
    pub serial_start: u64,
    /// Minimum width of a formatted serial, zero-padded.
    pub serial_digits: usize,
    /// Next value to allocate.
    pub current_serial: u64,
    pub labels: LabelSettings,
}

impl Counter {
    pub fn new(serial_start: u64, serial_digits: usize) -> Self {
        Self {
            serial_start,
            serial_digits,
            current_serial: serial_start,
            labels: LabelSettings::default(),
        }
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new(500, 6)
    }
}

/// Admin-editable counter fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CounterSettings {
    pub serial_digits: Option<usize>,
    pub current_serial: Option<u64>,
}

/// ZPL template plus the physical label size in inches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTemplate {
    pub zpl: String,
    pub width_in: f64,
    pub height_in: f64,
}

/// Printer resolutions the external renderer accepts.
pub const SUPPORTED_DPI: [u32; 4] = [152, 203, 300, 600];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSettings {
    pub serial_label: LabelTemplate,
    pub box_label: LabelTemplate,
    pub dpi: u32,
}

impl LabelSettings {
    /// Checks sizes are positive and the DPI is one the renderer supports.
    pub fn validate(&self) -> Result<(), String> {
        let templates = [
            ("serial_label", &self.serial_label),
            ("box_label", &self.box_label),
        ];
        for (name, template) in templates {
            if !(template.width_in > 0.0 && template.height_in > 0.0) {
                return Err(format!("{} dimensions must be positive", name));
            }
            if template.zpl.trim().is_empty() {
                return Err(format!("{} template is empty", name));
            }
        }
        if !SUPPORTED_DPI.contains(&self.dpi) {
            return Err(format!(
                "dpi {} not supported (expected one of {:?})",
                self.dpi, SUPPORTED_DPI
            ));
        }
        Ok(())
    }
}

const DEFAULT_SERIAL_LABEL: &str = "^XA
^FO30,20^A0N,28,28^FDP/N: {{part}}^FS
^FO30,55^A0N,28,28^FDS/N: {{serial}}^FS
^FO30,95^BY2^BCN,50,N,N,N^FD{{serial}}^FS
^XZ";

const DEFAULT_BOX_LABEL: &str = "^XA
^FO50,50^A0N,60,60^FDP/N: {{part}}^FS
^FO50,140^A0N,40,40^FDUPC: {{upc_full}}^FS
^FO50,220^BY3^BUN,150,Y,N,Y^FD{{upc_11_digits}}^FS
^XZ";

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            serial_label: LabelTemplate {
                zpl: DEFAULT_SERIAL_LABEL.into(),
                width_in: 2.0,
                height_in: 1.0,
            },
            box_label: LabelTemplate {
                zpl: DEFAULT_BOX_LABEL.into(),
                width_in: 4.0,
                height_in: 6.0,
            },
            dpi: 203,
        }
    }
}
