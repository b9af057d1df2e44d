// 📄 Row model - what the decoder hands to the engine
//
// A Row keeps its columns in source order. Field inference scans keys in
// that order, so a plain Vec of pairs is the right shape here.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CELL VALUES
// ============================================================================

/// One cell as decoded from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
    Empty,
}

impl CellValue {
    /// Build a text cell, mapping whitespace-only input to `Empty`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    /// True for values a spreadsheet user would call "nothing there":
    /// empty cells, blank strings, zero and NaN.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(n) => *n == 0.0 || n.is_nan(),
            CellValue::Date(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Trimmed string form, `None` when blank. Used for account keys.
    pub fn to_key(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        let key = match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            CellValue::Empty => return None,
        };
        Some(key)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

/// Integral numbers print without a fraction (account codes like 4000).
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ============================================================================
// ROW
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Row { cells }
    }

    /// Convenience constructor for literal rows in tests and sample data.
    pub fn from_pairs<V: Into<CellValue>>(pairs: Vec<(&str, V)>) -> Self {
        Row {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.iter().any(|(name, _)| name == column)
    }

    /// Column names in source order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_blank())
    }
}

// ============================================================================
// DATASET
// ============================================================================

/// The rows of one ingestion. Replaced wholesale, never patched.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: Uuid,
    pub source: String,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(source: impl Into<String>, rows: Vec<Row>) -> Self {
        Dataset {
            id: Uuid::new_v4(),
            source: source.into(),
            rows,
        }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row with any non-blank cell; the representative row for inference.
    pub fn sample_row(&self) -> Option<&Row> {
        self.rows.iter().find(|row| !row.is_blank())
    }

    /// Column names offered for manual field selection.
    pub fn available_fields(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_cells() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::text("   ").is_blank());
        assert!(CellValue::Number(0.0).is_blank());
        assert!(!CellValue::Number(12.0).is_blank());
        assert!(!CellValue::text("x").is_blank());
    }

    #[test]
    fn test_to_key_trims_and_formats() {
        assert_eq!(CellValue::text("  Rent ").to_key(), Some("Rent".to_string()));
        assert_eq!(CellValue::Number(4000.0).to_key(), Some("4000".to_string()));
        assert_eq!(CellValue::Empty.to_key(), None);
    }

    #[test]
    fn test_row_preserves_column_order() {
        let row = Row::from_pairs(vec![("Split", "A"), ("Date", "01/15/2023"), ("Amount", "1")]);
        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(keys, vec!["Split", "Date", "Amount"]);
        assert_eq!(row.get("Date"), Some(&CellValue::text("01/15/2023")));
        assert!(row.get("Memo").is_none());
    }

    #[test]
    fn test_sample_row_skips_blank_rows() {
        let blank = Row::from_pairs(vec![("Date", ""), ("Amount", "")]);
        let full = Row::from_pairs(vec![("Date", "01/15/2023"), ("Amount", "5")]);
        let dataset = Dataset::new("test", vec![blank, full.clone()]);
        assert_eq!(dataset.sample_row(), Some(&full));
        assert_eq!(dataset.available_fields(), vec!["Date", "Amount"]);
    }
}
