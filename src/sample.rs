// 🧪 Sample ledger - the built-in demo dataset
//
// Four accounts over three months of 2023. Used by `demo`, the server's
// sample endpoint and tests.

use crate::row::{Dataset, Row};

pub const SAMPLE_SOURCE: &str = "sample-ledger";

const SAMPLE_ROWS: [(&str, &str, &str); 6] = [
    ("01/15/2023", "Account 1", "1000"),
    ("01/20/2023", "Account 2", "2000"),
    ("02/10/2023", "Account 1", "1500"),
    ("02/15/2023", "Account 3", "3000"),
    ("03/05/2023", "Account 2", "1200"),
    ("03/15/2023", "Account 4", "2500"),
];

pub fn sample_rows() -> Vec<Row> {
    SAMPLE_ROWS
        .iter()
        .map(|(date, split, amount)| {
            Row::from_pairs(vec![("Date", *date), ("Split", *split), ("Amount", *amount)])
        })
        .collect()
}

pub fn sample_dataset() -> Dataset {
    Dataset::new(SAMPLE_SOURCE, sample_rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::CanonicalMonth;
    use crate::session::Session;

    #[test]
    fn test_sample_summary() {
        let mut session = Session::with_dataset(sample_dataset()).unwrap();
        let summary = session.summary().unwrap();

        assert_eq!(summary.accounts().len(), 4);
        assert_eq!(summary.months().len(), 3);
        assert_eq!(summary.row_total("Account 1"), Some(2500.0));
        assert_eq!(summary.row_total("Account 2"), Some(3200.0));
        assert_eq!(
            summary.column_total(CanonicalMonth::new(2023, 2).unwrap()),
            Some(4500.0)
        );
        assert_eq!(summary.grand_total(), 11200.0);
    }
}
