// 📊 Aggregation Engine - rows → account × month matrix
//
// Always recomputed from the original rows. Row-level problems (blank
// account, unparseable date or amount) drop the row or count it as zero;
// only dataset-level problems become errors.

use crate::amount::amount_or_zero;
use crate::dates::{parse_date, CanonicalMonth};
use crate::error::{PivotError, Result};
use crate::fields::{FieldBinding, FieldKind};
use crate::row::{CellValue, Row};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// SUMMARY
// ============================================================================

/// Counters for rows the engine silently set aside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub total_rows: usize,
    pub included_rows: usize,
    pub excluded_rows: usize,
    pub dropped_blank_account: usize,
    pub dropped_bad_date: usize,
}

/// Result of one aggregation run.
///
/// `cells[i][j]` is the running total of `accounts[i]` in `months[j]`, so
/// every account has an entry for every month by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    binding: FieldBinding,
    accounts: Vec<String>,
    months: Vec<CanonicalMonth>,
    cells: Vec<Vec<f64>>,
    excluded: Vec<(String, f64)>,
    stats: AggregationStats,
}

impl Summary {
    pub fn binding(&self) -> &FieldBinding {
        &self.binding
    }

    /// Account axis, sorted lexicographically.
    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    /// Month axis, sorted chronologically.
    pub fn months(&self) -> &[CanonicalMonth] {
        &self.months
    }

    pub fn stats(&self) -> &AggregationStats {
        &self.stats
    }

    fn account_index(&self, account: &str) -> Option<usize> {
        self.accounts.binary_search_by(|a| a.as_str().cmp(account)).ok()
    }

    /// Monthly amounts of one account, aligned with `months()`.
    pub fn row(&self, account: &str) -> Option<&[f64]> {
        self.account_index(account).map(|i| self.cells[i].as_slice())
    }

    pub fn amount(&self, account: &str, month: CanonicalMonth) -> Option<f64> {
        let i = self.account_index(account)?;
        let j = self.months.binary_search(&month).ok()?;
        Some(self.cells[i][j])
    }

    pub fn row_total(&self, account: &str) -> Option<f64> {
        self.row(account).map(|amounts| amounts.iter().sum())
    }

    /// Per-account totals, aligned with `accounts()`.
    pub fn row_totals(&self) -> Vec<f64> {
        self.cells.iter().map(|row| row.iter().sum()).collect()
    }

    /// Per-month totals, aligned with `months()`.
    pub fn column_totals(&self) -> Vec<f64> {
        (0..self.months.len())
            .map(|j| self.cells.iter().map(|row| row[j]).sum())
            .collect()
    }

    pub fn column_total(&self, month: CanonicalMonth) -> Option<f64> {
        let j = self.months.binary_search(&month).ok()?;
        Some(self.cells.iter().map(|row| row[j]).sum())
    }

    pub fn grand_total(&self) -> f64 {
        self.row_totals().iter().sum()
    }

    /// Excluded accounts in exclusion order.
    pub fn excluded_accounts(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(|(account, _)| account.as_str())
    }

    /// Totals of excluded accounts, not bucketed by month.
    pub fn excluded_totals(&self) -> &[(String, f64)] {
        &self.excluded
    }

    pub fn excluded_total(&self, account: &str) -> Option<f64> {
        self.excluded
            .iter()
            .find(|(name, _)| name == account)
            .map(|(_, total)| *total)
    }

    /// Serializable snapshot with totals filled in.
    pub fn report(&self, dataset_id: Option<Uuid>) -> SummaryReport {
        let row_totals = self.row_totals();
        let rows = self
            .accounts
            .iter()
            .zip(self.cells.iter())
            .zip(row_totals.iter())
            .map(|((account, amounts), total)| ReportRow {
                account: account.clone(),
                amounts: amounts.clone(),
                total: *total,
            })
            .collect();

        SummaryReport {
            dataset_id,
            binding: self.binding.clone(),
            accounts: self.accounts.clone(),
            months: self.months.clone(),
            rows,
            column_totals: self.column_totals(),
            grand_total: self.grand_total(),
            excluded: self
                .excluded
                .iter()
                .map(|(account, total)| ExcludedTotal {
                    account: account.clone(),
                    total: *total,
                })
                .collect(),
            stats: self.stats.clone(),
        }
    }
}

// ============================================================================
// REPORT (presentation snapshot)
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub account: String,
    pub amounts: Vec<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedTotal {
    pub account: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<Uuid>,
    pub binding: FieldBinding,
    pub accounts: Vec<String>,
    pub months: Vec<CanonicalMonth>,
    pub rows: Vec<ReportRow>,
    pub column_totals: Vec<f64>,
    pub grand_total: f64,
    pub excluded: Vec<ExcludedTotal>,
    pub stats: AggregationStats,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Distinct trimmed account values of `rows`, sorted. Blank values are skipped.
pub fn distinct_accounts(rows: &[Row], account_field: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(account_field).and_then(CellValue::to_key))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Build the account × month summary from the unfiltered rows.
pub fn aggregate(rows: &[Row], binding: &FieldBinding, exclusions: &[String]) -> Result<Summary> {
    let account_field = binding.require(FieldKind::Account)?;
    let date_field = binding.require(FieldKind::Date)?;
    let amount_field = binding.require(FieldKind::Amount)?;

    let excluded_set: HashSet<&str> = exclusions.iter().map(String::as_str).collect();
    let mut stats = AggregationStats {
        total_rows: rows.len(),
        ..Default::default()
    };

    // 1. Partition by account; blank accounts count nowhere
    let mut included: Vec<(&Row, String)> = Vec::new();
    let mut excluded: Vec<(&Row, String)> = Vec::new();
    for row in rows {
        let Some(account) = row.get(account_field).and_then(CellValue::to_key) else {
            stats.dropped_blank_account += 1;
            continue;
        };
        if excluded_set.contains(account.as_str()) {
            excluded.push((row, account));
        } else {
            included.push((row, account));
        }
    }
    stats.included_rows = included.len();
    stats.excluded_rows = excluded.len();

    // 2. Account axis
    let accounts: Vec<String> = included
        .iter()
        .map(|(_, account)| account.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if accounts.is_empty() {
        return Err(PivotError::NoValidAccounts);
    }

    // 3-4. Month axis from the dates that parse
    let row_months: Vec<Option<CanonicalMonth>> = included
        .iter()
        .map(|(row, _)| {
            row.get(date_field)
                .and_then(parse_date)
                .map(CanonicalMonth::from_date)
        })
        .collect();
    let months: Vec<CanonicalMonth> = row_months
        .iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if months.is_empty() {
        return Err(PivotError::NoValidDates);
    }

    // 5. Zeroed matrix
    let account_idx: HashMap<&str, usize> = accounts
        .iter()
        .enumerate()
        .map(|(i, a)| (a.as_str(), i))
        .collect();
    let month_idx: HashMap<CanonicalMonth, usize> =
        months.iter().enumerate().map(|(j, m)| (*m, j)).collect();
    let mut cells = vec![vec![0.0_f64; months.len()]; accounts.len()];

    // 6. Accumulate signed amounts
    for ((row, account), month) in included.iter().zip(row_months.iter()) {
        let Some(month) = month else {
            stats.dropped_bad_date += 1;
            continue;
        };
        let Some(value) = row.get(amount_field).filter(|v| !v.is_blank()) else {
            continue;
        };
        if let (Some(&i), Some(&j)) = (account_idx.get(account.as_str()), month_idx.get(month)) {
            cells[i][j] += amount_or_zero(value);
        }
    }

    // 7. Excluded totals, regardless of date
    let mut excluded_totals: Vec<(String, f64)> = Vec::new();
    for account in exclusions {
        if !excluded_totals.iter().any(|(name, _)| name == account) {
            excluded_totals.push((account.clone(), 0.0));
        }
    }
    for (row, account) in &excluded {
        let amount = row.get(amount_field).map(amount_or_zero).unwrap_or(0.0);
        if let Some(entry) = excluded_totals.iter_mut().find(|(name, _)| name == account) {
            entry.1 += amount;
        }
    }

    if stats.dropped_blank_account > 0 || stats.dropped_bad_date > 0 {
        debug!(
            "Dropped {} rows without account and {} rows with unparseable dates",
            stats.dropped_blank_account, stats.dropped_bad_date
        );
    }
    info!(
        "Aggregated {} rows into {} accounts × {} months ({} excluded accounts)",
        stats.included_rows,
        accounts.len(),
        months.len(),
        excluded_totals.len()
    );

    Ok(Summary {
        binding: binding.clone(),
        accounts,
        months,
        cells,
        excluded: excluded_totals,
        stats,
    })
}
