// 🔎 Field Inference - which column is the date, the amount, the account?
//
// Each field kind owns an ordered chain of strategies. The first strategy
// that finds a column wins; an empty chain result means "ask the user".

use crate::error::{PivotError, Result};
use crate::row::{CellValue, Row};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Numbers below this look like spreadsheet date serials (45000 ≈ 2023).
pub const EXCEL_SERIAL_SHAPE_MAX: f64 = 50_000.0;

// ============================================================================
// FIELD KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Date,
    Amount,
    Account,
}

impl FieldKind {
    pub const ALL: [FieldKind; 3] = [FieldKind::Date, FieldKind::Amount, FieldKind::Account];

    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Date => "date",
            FieldKind::Amount => "amount",
            FieldKind::Account => "account",
        }
    }

    /// Inference chain for this kind, tried in order.
    pub fn strategies(&self) -> &'static [FieldStrategy] {
        match self {
            FieldKind::Date => DATE_STRATEGIES,
            FieldKind::Amount => AMOUNT_STRATEGIES,
            FieldKind::Account => ACCOUNT_STRATEGIES,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for FieldKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "date" => Ok(FieldKind::Date),
            "amount" => Ok(FieldKind::Amount),
            "account" | "split" => Ok(FieldKind::Account),
            other => Err(format!("unknown field kind: {}", other)),
        }
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// One way of picking a column out of a sample row.
#[derive(Clone, Copy)]
pub enum FieldStrategy {
    /// First candidate present as a column name (case-sensitive).
    ExactName(&'static [&'static str]),
    /// First column whose lowercase name contains a keyword.
    KeywordSubstring(&'static [&'static str]),
    /// First column whose (non-blank) value passes the shape test.
    ValueShape(fn(&CellValue) -> bool),
}

impl fmt::Debug for FieldStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldStrategy::ExactName(names) => f.debug_tuple("ExactName").field(names).finish(),
            FieldStrategy::KeywordSubstring(kws) => {
                f.debug_tuple("KeywordSubstring").field(kws).finish()
            }
            FieldStrategy::ValueShape(_) => f.write_str("ValueShape(..)"),
        }
    }
}

impl FieldStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            FieldStrategy::ExactName(_) => "exact name",
            FieldStrategy::KeywordSubstring(_) => "partial name",
            FieldStrategy::ValueShape(_) => "value shape",
        }
    }

    pub fn find(&self, row: &Row) -> Option<String> {
        match self {
            FieldStrategy::ExactName(candidates) => candidates
                .iter()
                .find(|name| row.contains(name))
                .map(|name| name.to_string()),
            FieldStrategy::KeywordSubstring(keywords) => row
                .keys()
                .find(|key| {
                    let lower = key.to_lowercase();
                    keywords.iter().any(|kw| lower.contains(kw))
                })
                .map(str::to_string),
            FieldStrategy::ValueShape(test) => row
                .iter()
                .find(|(_, value)| !value.is_blank() && test(value))
                .map(|(key, _)| key.to_string()),
        }
    }
}

const DATE_NAMES: &[&str] = &[
    "Date",
    "date",
    "DATE",
    "Trans Date",
    "Transaction Date",
    "TRANS DATE",
    "TRANSACTION DATE",
    "TransactionDate",
    "transactiondate",
    "Txn Date",
    "TXN DATE",
    "TxnDate",
    "txndate",
    "Post Date",
    "POST DATE",
    "PostDate",
    "postdate",
    "Entry Date",
    "ENTRY DATE",
    "EntryDate",
    "entrydate",
];

const AMOUNT_NAMES: &[&str] = &[
    "Amount",
    "amount",
    "AMOUNT",
    "Debit",
    "Credit",
    "DEBIT",
    "CREDIT",
    "Amount (USD)",
    "AMOUNT (USD)",
    "Amt",
    "AMT",
    "amt",
    "Sum",
    "SUM",
    "sum",
    "Total",
    "TOTAL",
    "total",
    "Value",
    "VALUE",
    "value",
];

const ACCOUNT_NAMES: &[&str] = &[
    "Split",
    "split",
    "SPLIT",
    "Account",
    "account",
    "ACCOUNT",
    "Distribution account",
    "Distribution Account",
    "DISTRIBUTION ACCOUNT",
];

const DATE_KEYWORDS: &[&str] = &["date", "txn", "trans", "time"];

const AMOUNT_KEYWORDS: &[&str] = &[
    "amount", "amt", "debit", "credit", "sum", "total", "value", "price",
];

const DATE_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy::ExactName(DATE_NAMES),
    FieldStrategy::KeywordSubstring(DATE_KEYWORDS),
    FieldStrategy::ValueShape(looks_like_date),
];

const AMOUNT_STRATEGIES: &[FieldStrategy] = &[
    FieldStrategy::ExactName(AMOUNT_NAMES),
    FieldStrategy::KeywordSubstring(AMOUNT_KEYWORDS),
    FieldStrategy::ValueShape(looks_like_amount),
];

// Account columns hold free text; value shapes would guess wrong
const ACCOUNT_STRATEGIES: &[FieldStrategy] = &[FieldStrategy::ExactName(ACCOUNT_NAMES)];

// ============================================================================
// VALUE SHAPES
// ============================================================================

fn date_shape_res() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"^\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}").expect("invalid m/d/y regex"),
            Regex::new(r"^\d{4}[/\-]\d{1,2}[/\-]\d{1,2}").expect("invalid y/m/d regex"),
            Regex::new(r"^[A-Za-z]{3,9}\s+\d{1,2},?\s+\d{2,4}").expect("invalid month name regex"),
        ]
    })
}

fn amount_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$?-?[\d,]+(\.\d{1,2})?$").expect("invalid amount regex"))
}

pub fn looks_like_date(value: &CellValue) -> bool {
    match value {
        CellValue::Date(_) => true,
        CellValue::Text(s) => date_shape_res().iter().any(|re| re.is_match(s)),
        CellValue::Number(n) => *n > 0.0 && *n < EXCEL_SERIAL_SHAPE_MAX,
        CellValue::Empty => false,
    }
}

pub fn looks_like_amount(value: &CellValue) -> bool {
    match value {
        CellValue::Number(_) => true,
        CellValue::Text(s) => amount_shape_re().is_match(s),
        CellValue::Date(_) | CellValue::Empty => false,
    }
}

// ============================================================================
// INFERENCE
// ============================================================================

/// Run a strategy chain against a sample row.
pub fn infer_field_with(row: &Row, strategies: &[FieldStrategy]) -> Option<String> {
    strategies.iter().find_map(|strategy| {
        let found = strategy.find(row);
        if let Some(ref name) = found {
            debug!("Matched column {:?} by {}", name, strategy.label());
        }
        found
    })
}

pub fn infer_field(row: &Row, kind: FieldKind) -> Option<String> {
    let found = infer_field_with(row, kind.strategies());
    if found.is_none() {
        warn!(
            "No {} column found among {:?}",
            kind,
            row.keys().collect::<Vec<_>>()
        );
    }
    found
}

/// Resolved column per logical role. `None` means unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub date: Option<String>,
    pub amount: Option<String>,
    pub account: Option<String>,
}

impl FieldBinding {
    /// Infer every field from one representative row.
    pub fn infer(sample: &Row) -> Self {
        FieldBinding {
            date: infer_field(sample, FieldKind::Date),
            amount: infer_field(sample, FieldKind::Amount),
            account: infer_field(sample, FieldKind::Account),
        }
    }

    pub fn get(&self, kind: FieldKind) -> Option<&str> {
        match kind {
            FieldKind::Date => self.date.as_deref(),
            FieldKind::Amount => self.amount.as_deref(),
            FieldKind::Account => self.account.as_deref(),
        }
    }

    pub fn set(&mut self, kind: FieldKind, name: Option<String>) {
        match kind {
            FieldKind::Date => self.date = name,
            FieldKind::Amount => self.amount = name,
            FieldKind::Account => self.account = name,
        }
    }

    pub fn require(&self, kind: FieldKind) -> Result<&str> {
        self.get(kind).ok_or(PivotError::FieldNotFound(kind))
    }

    pub fn is_complete(&self) -> bool {
        FieldKind::ALL.iter().all(|kind| self.get(*kind).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_name_wins() {
        let row = Row::from_pairs(vec![
            ("Transaction Type", "Invoice"),
            ("Date", "01/15/2023"),
            ("Split", "Sales"),
            ("Amount", "100.00"),
        ]);
        // "Transaction Type" would match the keyword tier, but Date is exact
        assert_eq!(infer_field(&row, FieldKind::Date), Some("Date".to_string()));
        assert_eq!(infer_field(&row, FieldKind::Amount), Some("Amount".to_string()));
        assert_eq!(infer_field(&row, FieldKind::Account), Some("Split".to_string()));
    }

    #[test]
    fn test_candidate_priority_order() {
        let row = Row::from_pairs(vec![("Credit", "5"), ("Debit", "10")]);
        assert_eq!(infer_field(&row, FieldKind::Amount), Some("Debit".to_string()));
    }

    #[test]
    fn test_exact_name_is_case_sensitive() {
        let row = Row::from_pairs(vec![("Split", "A"), ("Posting DATE", "1/2/2023")]);
        // Not in the candidate list, picked up by keyword instead
        assert_eq!(infer_field(&row, FieldKind::Date), Some("Posting DATE".to_string()));
    }

    #[test]
    fn test_keyword_tier() {
        let row = Row::from_pairs(vec![("Memo", "coffee"), ("Net amt $", "12.00")]);
        assert_eq!(infer_field(&row, FieldKind::Amount), Some("Net amt $".to_string()));
    }

    #[test]
    fn test_value_shape_tier() {
        let row = Row::from_pairs(vec![
            ("Col A", CellValue::text("Groceries")),
            ("Col B", CellValue::text("2023-04-01")),
            ("Col C", CellValue::text("$1,204.10")),
        ]);
        assert_eq!(infer_field(&row, FieldKind::Date), Some("Col B".to_string()));
        assert_eq!(infer_field(&row, FieldKind::Amount), Some("Col C".to_string()));
    }

    #[test]
    fn test_value_shape_skips_blank_values() {
        let row = Row::from_pairs(vec![
            ("Col A", CellValue::Number(0.0)),
            ("Col B", CellValue::Number(44927.0)),
        ]);
        assert_eq!(infer_field(&row, FieldKind::Date), Some("Col B".to_string()));
    }

    #[test]
    fn test_textual_date_shape() {
        assert!(looks_like_date(&CellValue::text("March 15, 2023")));
        assert!(looks_like_date(&CellValue::text("1/5/23")));
        assert!(!looks_like_date(&CellValue::text("Office supplies")));
        assert!(!looks_like_date(&CellValue::Number(60000.0)));
    }

    #[test]
    fn test_amount_shape() {
        assert!(looks_like_amount(&CellValue::text("-1,000")));
        assert!(looks_like_amount(&CellValue::text("$12.5")));
        assert!(!looks_like_amount(&CellValue::text("12.345")));
        assert!(!looks_like_amount(&CellValue::text("abc")));
    }

    #[test]
    fn test_account_has_no_shape_fallback() {
        let row = Row::from_pairs(vec![("Category", "Rent"), ("Date", "1/1/2023")]);
        assert_eq!(infer_field(&row, FieldKind::Account), None);
        assert_eq!(
            infer_field(&row, FieldKind::Account).is_none(),
            FieldBinding::infer(&row).account.is_none()
        );
    }

    #[test]
    fn test_distribution_account_candidate() {
        let row = Row::from_pairs(vec![("Distribution account", "Utilities")]);
        assert_eq!(
            infer_field(&row, FieldKind::Account),
            Some("Distribution account".to_string())
        );
    }

    #[test]
    fn test_nothing_found() {
        let row = Row::from_pairs(vec![("Memo", "hello"), ("Name", "Acme")]);
        assert_eq!(infer_field(&row, FieldKind::Date), None);
        assert_eq!(infer_field(&row, FieldKind::Amount), None);
    }

    #[test]
    fn test_binding_require() {
        let mut binding = FieldBinding::default();
        assert!(matches!(
            binding.require(FieldKind::Date),
            Err(PivotError::FieldNotFound(FieldKind::Date))
        ));
        binding.set(FieldKind::Date, Some("When".to_string()));
        assert_eq!(binding.require(FieldKind::Date).unwrap(), "When");
        assert!(!binding.is_complete());
    }

    #[test]
    fn test_field_kind_from_str() {
        assert_eq!("Amount".parse::<FieldKind>().unwrap(), FieldKind::Amount);
        assert_eq!("split".parse::<FieldKind>().unwrap(), FieldKind::Account);
        assert!("memo".parse::<FieldKind>().is_err());
    }
}
