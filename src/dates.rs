// 📅 Date Normalizer - raw cell → calendar date → month bucket
//
// Parsing never fails loudly: malformed dates are normal in ledger exports,
// so every path returns Option and the caller drops the row.

use crate::row::CellValue;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How to read the first two parts of a slash-delimited date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashDateOrder {
    /// 03/15/2023 (US, QuickBooks default)
    MonthFirst,
    /// 15/03/2023
    DayFirst,
}

/// Slash dates are month-first unless a caller opts into another order.
pub const SLASH_DATE_ORDER: SlashDateOrder = SlashDateOrder::MonthFirst;

/// Latest serial chrono can represent in the 1900 system (9999-12-31).
const MAX_EXCEL_SERIAL: i64 = 2_958_465;

/// Textual formats tried last, in order.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%Y/%m/%d",
    "%Y.%m.%d",
];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

// ============================================================================
// PARSING
// ============================================================================

/// Parse a cell into a calendar date using the default slash order.
pub fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    parse_date_with_order(value, SLASH_DATE_ORDER)
}

/// Rules, first success wins:
/// 1. native date
/// 2. `a/b/year` per `order`
/// 3. `year-month-day`
/// 4. spreadsheet serial number
/// 5. textual fallback formats
pub fn parse_date_with_order(value: &CellValue, order: SlashDateOrder) -> Option<NaiveDate> {
    if value.is_blank() {
        return None;
    }

    match value {
        CellValue::Date(date) => Some(*date),
        CellValue::Number(serial) => {
            let date = excel_serial_to_date(*serial);
            if date.is_none() {
                debug!("Serial {} is outside the spreadsheet date range", serial);
            }
            date
        }
        CellValue::Text(raw) => {
            let raw = raw.trim();
            let date = parse_slash_date(raw, order)
                .or_else(|| parse_dash_date(raw))
                .or_else(|| parse_fallback(raw));
            if date.is_none() {
                debug!("Failed to parse date value: {:?}", raw);
            }
            date
        }
        CellValue::Empty => None,
    }
}

fn parse_slash_date(raw: &str, order: SlashDateOrder) -> Option<NaiveDate> {
    if !raw.contains('/') {
        return None;
    }
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let first = leading_int(parts[0])?;
    let second = leading_int(parts[1])?;
    let mut year = leading_int(parts[2])?;

    let (month, day) = match order {
        SlashDateOrder::MonthFirst => (first, second),
        SlashDateOrder::DayFirst => (second, first),
    };

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    // Two-digit years land in 2000-2099. Spreadsheet date constructors put
    // them in 1900-1999; this deliberately differs.
    if (0..100).contains(&year) {
        year += 2000;
    }

    date_with_carry(year, month, day)
}

fn parse_dash_date(raw: &str) -> Option<NaiveDate> {
    if !raw.contains('-') {
        return None;
    }
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() != 3 {
        return None;
    }

    let year = leading_int(parts[0])?;
    let month = leading_int(parts[1])?;
    let day = leading_int(parts[2])?;

    if year <= 1900 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    date_with_carry(year, month, day)
}

fn parse_fallback(raw: &str) -> Option<NaiveDate> {
    for format in FALLBACK_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    for format in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Convert a serial from the 1900 date system.
///
/// Serials below 61 count from 1899-12-31 so that the phantom 1900-02-29
/// (serial 60) lands on March 1st; later serials count from 1899-12-30.
/// The fractional part is the time of day and is ignored.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.floor() as i64;
    if days > MAX_EXCEL_SERIAL {
        return None;
    }

    let epoch = if days < 61 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    epoch.checked_add_signed(Duration::days(days))
}

/// Day overflow carries into the next month (02/31 → 03/03), the way
/// spreadsheet date arithmetic does.
fn date_with_carry(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    let year = i32::try_from(year).ok()?;
    let first = NaiveDate::from_ymd_opt(year, month as u32, 1)?;
    first.checked_add_signed(Duration::days(day - 1))
}

/// Integer prefix of a string, after leading whitespace: "2023 10:00" → 2023.
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

// ============================================================================
// CANONICAL MONTH
// ============================================================================

/// A (year, month) bucket. Field order makes the derived ordering
/// chronological: year first, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalMonth {
    pub year: i32,
    pub month: u32,
}

impl CanonicalMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(CanonicalMonth { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        CanonicalMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Aggregation key, e.g. "3/2023". Not sortable as a string.
    pub fn key(&self) -> String {
        format!("{}/{}", self.month, self.year)
    }

    /// Inverse of `key`.
    pub fn parse_key(key: &str) -> Option<Self> {
        let (month, year) = key.trim().split_once('/')?;
        CanonicalMonth::new(year.parse().ok()?, month.parse().ok()?)
    }

    /// Display label, e.g. "Mar 2023".
    pub fn label(&self) -> String {
        match NaiveDate::from_ymd_opt(self.year, self.month, 1) {
            Some(date) => date.format("%b %Y").to_string(),
            None => self.key(),
        }
    }
}

impl fmt::Display for CanonicalMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.month, self.year)
    }
}

impl Serialize for CanonicalMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

/// Month bucket key for a date: "{month}/{year}".
pub fn month_key(date: NaiveDate) -> String {
    CanonicalMonth::from_date(date).key()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_us_slash_date() {
        let date = parse_date(&text("03/15/2023")).unwrap();
        assert_eq!(date, ymd(2023, 3, 15));
        assert_eq!(month_key(date), "3/2023");
    }

    #[test]
    fn test_slash_date_out_of_range_falls_through() {
        // Day-first input with day > 12 in the month slot is rejected
        assert_eq!(parse_date(&text("15/03/2023")), None);
        // Year-first with slashes is picked up by the fallback formats
        assert_eq!(parse_date(&text("2023/03/15")), Some(ymd(2023, 3, 15)));
    }

    #[test]
    fn test_day_first_order() {
        let date = parse_date_with_order(&text("15/03/2023"), SlashDateOrder::DayFirst);
        assert_eq!(date, Some(ymd(2023, 3, 15)));
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(parse_date(&text("1/5/23")), Some(ymd(2023, 1, 5)));
    }

    #[test]
    fn test_slash_date_with_time_suffix() {
        assert_eq!(parse_date(&text("01/15/2023 10:30 AM")), Some(ymd(2023, 1, 15)));
    }

    #[test]
    fn test_day_overflow_carries() {
        assert_eq!(parse_date(&text("02/31/2023")), Some(ymd(2023, 3, 3)));
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(parse_date(&text("2023-01-20")), Some(ymd(2023, 1, 20)));
        assert_eq!(parse_date(&text("2023-01-20T08:00:00")), Some(ymd(2023, 1, 20)));
    }

    #[test]
    fn test_dash_date_rejects_early_years() {
        assert_eq!(parse_date(&text("1850-01-01")), None);
    }

    #[test]
    fn test_excel_serial() {
        let date = parse_date(&CellValue::Number(45000.0)).unwrap();
        assert_eq!(date, ymd(2023, 3, 15));
        assert_eq!(excel_serial_to_date(1.0), Some(ymd(1900, 1, 1)));
        assert_eq!(excel_serial_to_date(59.0), Some(ymd(1900, 2, 28)));
        assert_eq!(excel_serial_to_date(61.0), Some(ymd(1900, 3, 1)));
        assert_eq!(excel_serial_to_date(44927.75), Some(ymd(2023, 1, 1)));
        assert_eq!(excel_serial_to_date(-3.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_textual_dates() {
        assert_eq!(parse_date(&text("March 15, 2023")), Some(ymd(2023, 3, 15)));
        assert_eq!(parse_date(&text("Mar 15, 2023")), Some(ymd(2023, 3, 15)));
        assert_eq!(parse_date(&text("15 Mar 2023")), Some(ymd(2023, 3, 15)));
        assert_eq!(parse_date(&text("15-Mar-2023")), Some(ymd(2023, 3, 15)));
    }

    #[test]
    fn test_native_date_passthrough() {
        let d = ymd(2022, 12, 31);
        assert_eq!(parse_date(&CellValue::Date(d)), Some(d));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_date(&text("not a date")), None);
        assert_eq!(parse_date(&text("Total for Checking")), None);
        assert_eq!(parse_date(&CellValue::Empty), None);
        assert_eq!(parse_date(&CellValue::Number(0.0)), None);
        assert_eq!(parse_date(&text("1/2")), None);
    }

    #[test]
    fn test_month_ordering_is_chronological() {
        let mut months = vec![
            CanonicalMonth::new(2023, 10).unwrap(),
            CanonicalMonth::new(2022, 12).unwrap(),
            CanonicalMonth::new(2023, 2).unwrap(),
        ];
        months.sort();
        let keys: Vec<String> = months.iter().map(|m| m.key()).collect();
        // Lexicographic order would put "10/2023" first
        assert_eq!(keys, vec!["12/2022", "2/2023", "10/2023"]);
    }

    #[test]
    fn test_month_key_round_trip_and_label() {
        let month = CanonicalMonth::parse_key("3/2023").unwrap();
        assert_eq!(month, CanonicalMonth { year: 2023, month: 3 });
        assert_eq!(month.to_string(), "3/2023");
        assert_eq!(month.label(), "Mar 2023");
        assert!(CanonicalMonth::parse_key("13/2023").is_none());
        assert!(CanonicalMonth::parse_key("March").is_none());
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int(" 12abc"), Some(12));
        assert_eq!(leading_int("-4"), Some(-4));
        assert_eq!(leading_int("abc"), None);
    }
}
