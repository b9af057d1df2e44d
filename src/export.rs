// 📤 Export - Summary → row-major table → CSV / JSON / text
//
// Layout: header ["Account", months..., "Total"], one row per account,
// then a "Total" row with column totals and the grand total.

use crate::aggregation::{Summary, SummaryReport};
use crate::amount::format_currency;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

pub const TOTAL_LABEL: &str = "Total";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportTable {
    pub header: Vec<String>,
    pub rows: Vec<ExportRow>,
}

/// Flatten a summary into the export layout. Month headers use display
/// labels ("Jan 2023").
pub fn summary_table(summary: &Summary) -> ExportTable {
    let mut header = Vec::with_capacity(summary.months().len() + 2);
    header.push("Account".to_string());
    header.extend(summary.months().iter().map(|m| m.label()));
    header.push(TOTAL_LABEL.to_string());

    let mut rows: Vec<ExportRow> = summary
        .accounts()
        .iter()
        .filter_map(|account| {
            let amounts = summary.row(account)?;
            let mut values = amounts.to_vec();
            values.push(amounts.iter().sum());
            Some(ExportRow {
                label: account.clone(),
                values,
            })
        })
        .collect();

    let mut totals = summary.column_totals();
    totals.push(summary.grand_total());
    rows.push(ExportRow {
        label: TOTAL_LABEL.to_string(),
        values: totals,
    });

    ExportTable { header, rows }
}

/// CSV with amounts to two decimals.
pub fn write_csv<W: Write>(summary: &Summary, writer: W) -> Result<()> {
    let table = summary_table(summary);
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(&table.header)?;
    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.label.clone());
        record.extend(row.values.iter().map(|v| format!("{:.2}", v)));
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

pub fn csv_string(summary: &Summary) -> Result<String> {
    let mut buffer = Vec::new();
    write_csv(summary, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn write_json<W: Write>(report: &SummaryReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report).map_err(std::io::Error::from)?;
    writeln!(writer)?;
    Ok(())
}

/// Fixed-width table for terminals, followed by the excluded accounts.
pub fn render_text(summary: &Summary) -> String {
    let table = summary_table(summary);
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            let mut line = vec![row.label.clone()];
            line.extend(row.values.iter().map(|v| format_currency(*v)));
            line
        })
        .collect();

    let widths: Vec<usize> = (0..table.header.len())
        .map(|col| {
            cells
                .iter()
                .filter_map(|line| line.get(col))
                .chain(std::iter::once(&table.header[col]))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |line: &[String]| -> String {
        line.iter()
            .zip(widths.iter())
            .enumerate()
            .map(|(col, (text, width))| {
                if col == 0 {
                    format!("{:<width$}", text, width = *width)
                } else {
                    format!("{:>width$}", text, width = *width)
                }
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let rule = "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1));
    let mut out = String::new();
    out.push_str(&format_line(&table.header));
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');

    let last = cells.len().saturating_sub(1);
    for (i, line) in cells.iter().enumerate() {
        if i == last {
            out.push_str(&rule);
            out.push('\n');
        }
        out.push_str(&format_line(line));
        out.push('\n');
    }

    if !summary.excluded_totals().is_empty() {
        out.push_str("\nExcluded accounts:\n");
        for (account, total) in summary.excluded_totals() {
            out.push_str(&format!("  {}  {}\n", account, format_currency(*total)));
        }
    }

    let stats = summary.stats();
    if stats.dropped_blank_account + stats.dropped_bad_date > 0 {
        out.push_str(&format!(
            "\nSkipped rows: {} without account, {} without a readable date\n",
            stats.dropped_blank_account, stats.dropped_bad_date
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::aggregate;
    use crate::fields::FieldBinding;
    use crate::row::Row;

    fn summary(exclusions: &[String]) -> Summary {
        let rows = vec![
            Row::from_pairs(vec![("Date", "01/15/2023"), ("Split", "Sales"), ("Amount", "1000")]),
            Row::from_pairs(vec![("Date", "01/20/2023"), ("Split", "Rent"), ("Amount", "-250.5")]),
            Row::from_pairs(vec![("Date", "02/10/2023"), ("Split", "Sales"), ("Amount", "$1,500")]),
        ];
        let binding = FieldBinding {
            date: Some("Date".to_string()),
            amount: Some("Amount".to_string()),
            account: Some("Split".to_string()),
        };
        aggregate(&rows, &binding, exclusions).unwrap()
    }

    #[test]
    fn test_summary_table_layout() {
        let table = summary_table(&summary(&[]));
        assert_eq!(table.header, vec!["Account", "Jan 2023", "Feb 2023", "Total"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].label, "Rent");
        assert_eq!(table.rows[0].values, vec![-250.5, 0.0, -250.5]);
        assert_eq!(table.rows[1].values, vec![1000.0, 1500.0, 2500.0]);

        let total = table.rows.last().unwrap();
        assert_eq!(total.label, "Total");
        assert_eq!(total.values, vec![749.5, 1500.0, 2249.5]);
    }

    #[test]
    fn test_csv_export() {
        let csv = csv_string(&summary(&[])).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Account,Jan 2023,Feb 2023,Total");
        assert_eq!(lines[1], "Rent,-250.50,0.00,-250.50");
        assert_eq!(lines[2], "Sales,1000.00,1500.00,2500.00");
        assert_eq!(lines[3], "Total,749.50,1500.00,2249.50");
    }

    #[test]
    fn test_json_export() {
        let mut buffer = Vec::new();
        write_json(&summary(&[]).report(None), &mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["grand_total"], 2249.5);
        assert_eq!(value["months"][0], "1/2023");
    }

    #[test]
    fn test_render_text() {
        let text = render_text(&summary(&["Rent".to_string()]));
        assert!(text.starts_with("Account"));
        assert!(text.contains("$2,500.00"));
        assert!(text.contains("Excluded accounts:"));
        assert!(text.contains("Rent  -$250.50"));
    }
}
