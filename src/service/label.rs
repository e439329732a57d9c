use serde::Serialize;

use crate::contracts::SerialRecord;

/// Values substituted into a ZPL label template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelData {
    pub serial: String,
    pub part: String,
    pub upc: Option<String>,
}

impl From<&SerialRecord> for LabelData {
    fn from(record: &SerialRecord) -> Self {
        Self {
            serial: record.serial_number.clone(),
            part: record.part_number.clone(),
            upc: record.upc.clone(),
        }
    }
}

impl LabelData {
    /// UPC-A body without the check digit.
    pub fn upc_11_digits(&self) -> &str {
        let upc = self.upc.as_deref().unwrap_or_default();
        match upc.char_indices().nth(11) {
            Some((end, _)) => &upc[..end],
            None => upc,
        }
    }

    fn token(&self, name: &str) -> Option<&str> {
        match name {
            "serial" => Some(&self.serial),
            "part" => Some(&self.part),
            "upc_full" => Some(self.upc.as_deref().unwrap_or_default()),
            "upc_11_digits" => Some(self.upc_11_digits()),
            _ => None,
        }
    }
}

/// Fills `{{serial}}`, `{{part}}`, `{{upc_full}}` and `{{upc_11_digits}}`.
/// Other `{{...}}` tokens are left as written.
///
/// The template is scanned once; substituted values are never re-expanded.
pub fn render_label(template: &str, data: &LabelData) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 2..];
        let value = tail
            .find("}}")
            .and_then(|close| data.token(&tail[..close]).map(|v| (v, close)));

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
