// 🏗️ Decoder Framework
// Turns a tabular source (CSV, XLSX, XLS) into header-keyed rows.
//
// The engine never sees the file format: every decoder produces the same
// Vec<Row> with stable column names, one entry per header column.

use crate::dates::excel_serial_to_date;
use crate::error::{PivotError, Result};
use crate::row::{CellValue, Dataset, Row};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// QuickBooks puts four title lines above the column headers.
pub const DEFAULT_SPREADSHEET_HEADER_ROW: usize = 4;

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceFormat - which decoder handles a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
    Xls,
}

impl SourceFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::Xlsx => "Excel workbook",
            SourceFormat::Xls => "Excel 97-2003 workbook",
        }
    }

    /// Header row used when the caller doesn't pick one.
    pub fn default_header_row(&self) -> usize {
        match self {
            SourceFormat::Csv => 0,
            SourceFormat::Xlsx | SourceFormat::Xls => DEFAULT_SPREADSHEET_HEADER_ROW,
        }
    }
}

impl FromStr for SourceFormat {
    type Err = PivotError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" | "txt" => Ok(SourceFormat::Csv),
            "xlsx" | "xlsm" => Ok(SourceFormat::Xlsx),
            "xls" => Ok(SourceFormat::Xls),
            other => Err(PivotError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decoder knobs. `header_row` is the zero-based sheet row holding the
/// column names; `None` uses the format default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    pub header_row: Option<usize>,
}

impl DecodeOptions {
    pub fn with_header_row(header_row: usize) -> Self {
        DecodeOptions {
            header_row: Some(header_row),
        }
    }

    fn header_row_for(&self, format: SourceFormat) -> usize {
        self.header_row.unwrap_or_else(|| format.default_header_row())
    }
}

// ============================================================================
// DECODER TRAIT
// ============================================================================

/// SheetDecoder - the one interface every source format implements
pub trait SheetDecoder: Send + Sync {
    /// Decode raw file contents into rows.
    fn decode_bytes(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Vec<Row>>;

    /// Get the format this decoder handles
    fn source_format(&self) -> SourceFormat;

    /// Read and decode a file from disk.
    fn decode_file(&self, path: &Path, options: &DecodeOptions) -> Result<Vec<Row>> {
        let bytes = std::fs::read(path).map_err(|e| {
            PivotError::DecodeFailure(format!("failed to read {}: {}", path.display(), e))
        })?;
        self.decode_bytes(&bytes, options)
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect source format from the file extension
///
/// # Examples:
/// ```
/// use ledger_pivot::{detect_format, SourceFormat};
/// use std::path::Path;
/// assert_eq!(detect_format(Path::new("GL 2023.xlsx")).unwrap(), SourceFormat::Xlsx);
/// ```
pub fn detect_format(file_path: &Path) -> Result<SourceFormat> {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    extension.parse().map_err(|_| {
        PivotError::UnsupportedFormat(format!(
            "{} (expected .csv, .xlsx or .xls)",
            file_path.display()
        ))
    })
}

/// Get the decoder for a source format
pub fn get_decoder(format: SourceFormat) -> Box<dyn SheetDecoder> {
    match format {
        SourceFormat::Csv => Box::new(CsvDecoder::new()),
        SourceFormat::Xlsx | SourceFormat::Xls => Box::new(WorkbookDecoder::new(format)),
    }
}

/// Detect, decode and wrap a file as a dataset.
pub fn load_dataset(path: &Path, options: &DecodeOptions) -> Result<Dataset> {
    let format = detect_format(path)?;
    let rows = get_decoder(format).decode_file(path, options)?;
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();
    info!("Decoded {} rows from {} ({})", rows.len(), source, format.name());
    Ok(Dataset::new(source, rows))
}

/// Decode in-memory contents (uploads) as a dataset.
pub fn decode_dataset(
    format: SourceFormat,
    bytes: &[u8],
    source: &str,
    options: &DecodeOptions,
) -> Result<Dataset> {
    let rows = get_decoder(format).decode_bytes(bytes, options)?;
    info!("Decoded {} rows from {} ({})", rows.len(), source, format.name());
    Ok(Dataset::new(source, rows))
}

// ============================================================================
// GRID → ROWS
// ============================================================================

/// Key rows by the header row. Rows above the header are ignored, fully
/// empty rows are skipped, short rows are padded with `Empty`.
fn rows_from_grid(grid: Vec<Vec<CellValue>>, header_row: usize) -> Vec<Row> {
    if grid.len() <= header_row {
        debug!(
            "Header row {} is past the end of the sheet ({} rows)",
            header_row,
            grid.len()
        );
        return Vec::new();
    }

    let width = grid[header_row..].iter().map(Vec::len).max().unwrap_or(0);
    let headers = header_names(&grid[header_row], width);
    debug!("Columns: {:?}", headers);

    grid.into_iter()
        .skip(header_row + 1)
        .filter(|cells| cells.iter().any(|c| *c != CellValue::Empty))
        .map(|mut cells| {
            cells.resize(width, CellValue::Empty);
            Row::new(headers.iter().cloned().zip(cells).collect())
        })
        .collect()
}

/// Blank headers become `__EMPTY`, `__EMPTY_1`, …; repeats get `_1`, `_2`, ….
fn header_names(header_cells: &[CellValue], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|i| {
            let base = header_cells
                .get(i)
                .and_then(CellValue::to_key)
                .map(|h| h.trim_start_matches('\u{feff}').to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "__EMPTY".to_string());
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

// ============================================================================
// CSV
// ============================================================================

/// CSV decoder. The csv reader drops empty lines, so `header_row` counts
/// non-empty lines.
pub struct CsvDecoder;

impl CsvDecoder {
    pub fn new() -> Self {
        CsvDecoder
    }
}

impl Default for CsvDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetDecoder for CsvDecoder {
    fn decode_bytes(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Vec<Row>> {
        use csv::ReaderBuilder;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut grid = Vec::new();
        // Byte records: legacy exports (Windows-1252) are read lossily
        for (line_num, result) in reader.byte_records().enumerate() {
            let record = result.map_err(|e| {
                PivotError::DecodeFailure(format!("CSV line {}: {}", line_num + 1, e))
            })?;
            grid.push(
                record
                    .iter()
                    .map(|field| CellValue::text(String::from_utf8_lossy(field)))
                    .collect(),
            );
        }

        Ok(rows_from_grid(grid, options.header_row_for(SourceFormat::Csv)))
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::Csv
    }
}

// ============================================================================
// EXCEL WORKBOOKS (first sheet only)
// ============================================================================

pub struct WorkbookDecoder {
    format: SourceFormat,
}

impl WorkbookDecoder {
    pub fn new(format: SourceFormat) -> Self {
        WorkbookDecoder { format }
    }
}

impl SheetDecoder for WorkbookDecoder {
    fn decode_bytes(&self, bytes: &[u8], options: &DecodeOptions) -> Result<Vec<Row>> {
        let cursor = Cursor::new(bytes);
        let range = match self.format {
            SourceFormat::Xls => first_sheet::<Xls<_>, _>(cursor)?,
            _ => first_sheet::<Xlsx<_>, _>(cursor)?,
        };

        // Ranges start at the first used cell; keep sheet row numbering
        let offset = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let mut grid: Vec<Vec<CellValue>> = vec![Vec::new(); offset];
        grid.extend(
            range
                .rows()
                .map(|row| row.iter().map(cell_from_data).collect::<Vec<_>>()),
        );

        Ok(rows_from_grid(grid, options.header_row_for(self.format)))
    }

    fn source_format(&self) -> SourceFormat {
        self.format
    }
}

fn first_sheet<W, RS>(reader: RS) -> Result<Range<Data>>
where
    RS: Read + Seek,
    W: Reader<RS>,
    W::Error: Display,
{
    let mut workbook =
        W::new(reader).map_err(|e| PivotError::DecodeFailure(format!("open workbook: {}", e)))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| PivotError::DecodeFailure("workbook has no sheets".to_string()))?;
    debug!("Reading sheet {:?}", first);
    workbook
        .worksheet_range(&first)
        .map_err(|e| PivotError::DecodeFailure(format!("read sheet {}: {}", first, e)))
}

fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::text(s.as_str()),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            match excel_serial_to_date(serial) {
                Some(date) => CellValue::Date(date),
                None => CellValue::Number(serial),
            }
        }
        Data::DateTimeIso(s) => CellValue::text(s.as_str()),
        // Error cells, durations and blanks carry nothing the engine can use
        _ => CellValue::Empty,
    }
}
