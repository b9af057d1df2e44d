// ⚠️ Error taxonomy for ingestion and aggregation
// Every variant is terminal for one invocation, never for the session.

use crate::fields::FieldKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PivotError {
    /// Source file unreadable or undecodable; no dataset is installed.
    #[error("failed to decode source: {0}")]
    DecodeFailure(String),

    #[error("no data rows found in the source")]
    EmptyDataset,

    /// Inference (or a manual choice) left this field unresolved.
    #[error("no {0} column found; choose one manually")]
    FieldNotFound(FieldKind),

    #[error("no account values found in the data")]
    NoValidAccounts,

    #[error("no valid dates found in the data")]
    NoValidDates,

    #[error("account '{0}' is not present in the dataset")]
    UnknownAccount(String),

    #[error("no dataset loaded")]
    NoDataset,

    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PivotError>;
