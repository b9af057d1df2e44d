// Ledger Pivot - Core Library
// Exposes all modules for use in CLI, TUI, API server, and tests

pub mod error;
pub mod row;
pub mod dates;        // Date normalizer + month buckets
pub mod amount;       // Amount cleaning + currency display
pub mod fields;       // Field inference (date / amount / account)
pub mod aggregation;  // Account × month matrix
pub mod filters;      // Exclusions + manual column choices
pub mod session;      // One dataset, one filter state
pub mod decoder;      // CSV / XLSX / XLS → rows
pub mod export;       // CSV / JSON / text output
pub mod sample;       // Built-in demo ledger

// Re-export commonly used types
pub use error::{PivotError, Result};
pub use row::{CellValue, Dataset, Row};
pub use dates::{
    excel_serial_to_date, month_key, parse_date, parse_date_with_order,
    CanonicalMonth, SlashDateOrder, SLASH_DATE_ORDER,
};
pub use amount::{amount_or_zero, format_currency, parse_amount};
pub use fields::{
    infer_field, infer_field_with, looks_like_amount, looks_like_date,
    FieldBinding, FieldKind, FieldStrategy, EXCEL_SERIAL_SHAPE_MAX,
};
pub use aggregation::{
    aggregate, distinct_accounts,
    AggregationStats, ExcludedTotal, ReportRow, Summary, SummaryReport,
};
pub use filters::FilterState;
pub use session::{IngestTicket, Session};
pub use decoder::{
    decode_dataset, detect_format, get_decoder, load_dataset,
    CsvDecoder, DecodeOptions, SheetDecoder, SourceFormat, WorkbookDecoder,
    DEFAULT_SPREADSHEET_HEADER_ROW,
};
pub use export::{
    csv_string, render_text, summary_table, write_csv, write_json, ExportRow, ExportTable,
};
pub use sample::{sample_dataset, sample_rows};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
