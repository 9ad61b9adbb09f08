//! Spreadsheet parsing for workbooks (calamine) and CSV (csv).
//!
//! The first non-blank row of a sheet is its header. Blank header cells are
//! named `__EMPTY`, `__EMPTY_1`, ...; repeated names get `_1`, `_2`, ...
//! suffixes. Fully blank rows are skipped. Data cells past the last header
//! cell become extra `__EMPTY` columns. CSV fields that are not valid UTF-8
//! are read as Latin-1.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use serde_json::{Number, Value};
use tracing::info;

use crate::error::AppError;
use crate::sheet::dataset::{Dataset, Sheet, Workbook};

/// Extensions parsed as workbooks.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Name given to the single sheet of a CSV file.
pub const CSV_SHEET_NAME: &str = "Sheet1";

const UTF8_BOM: &str = "\u{feff}";

/// Parses a spreadsheet file on a blocking thread.
pub async fn parse_file(path: &Path) -> Result<Workbook, AppError> {
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || parse_file_blocking(&path))
        .await
        .map_err(|e| AppError::Internal(format!("Parse task failed: {}", e)))?
}

/// Parses a spreadsheet file, choosing the reader by extension.
pub fn parse_file_blocking(path: &Path) -> Result<Workbook, AppError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let workbook = if ext == "csv" {
        let file = std::fs::File::open(path)
            .map_err(|e| AppError::SpreadsheetParse(format!("Failed to open file: {}", e)))?;
        Workbook {
            sheets: vec![Sheet {
                name: CSV_SHEET_NAME.to_string(),
                dataset: parse_csv_reader(file)?,
            }],
        }
    } else if WORKBOOK_EXTENSIONS.contains(&ext.as_str()) {
        parse_workbook(path)?
    } else {
        return Err(AppError::SpreadsheetParse(format!(
            "Unsupported file type '{}'. Use .xlsx, .xls, .xlsm, .xlsb, .ods or .csv",
            if ext.is_empty() { "(none)" } else { ext.as_str() }
        )));
    };

    info!(
        "[WIZARD] Parsed {} sheet(s) from {}",
        workbook.sheets.len(),
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );

    Ok(workbook)
}

/// Parses CSV text (e.g. a downloaded notebook output).
pub fn parse_csv_text(text: &str) -> Result<Dataset, AppError> {
    parse_csv_reader(text.as_bytes())
}

fn parse_csv_reader<R: Read>(reader: R) -> Result<Dataset, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, result) in reader.byte_records().enumerate() {
        let record = result
            .map_err(|e| AppError::SpreadsheetParse(format!("Failed to read CSV record: {}", e)))?;
        let cells = record
            .iter()
            .map(|bytes| {
                let text = decode_field(bytes);
                let field: &str = if index == 0 {
                    text.strip_prefix(UTF8_BOM).unwrap_or(&text)
                } else {
                    &text
                };
                infer_scalar(field)
            })
            .collect();
        rows.push(cells);
    }

    Ok(rows_to_dataset(rows))
}

/// UTF-8 when valid, otherwise one char per byte (Latin-1).
fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

fn parse_workbook(path: &Path) -> Result<Workbook, AppError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| AppError::SpreadsheetParse(format!("Failed to open workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| AppError::SpreadsheetParse(format!("Failed to read sheet '{}': {}", name, e)))?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect();

        sheets.push(Sheet {
            name,
            dataset: rows_to_dataset(rows),
        });
    }

    Ok(Workbook { sheets })
}

// ─────────────────────────────────────────────────────────────────────────────
// Cells
// ─────────────────────────────────────────────────────────────────────────────

fn empty() -> Value {
    Value::String(String::new())
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty()) || value.is_null()
}

/// Whole floats become integers; non-finite values become text.
fn float_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        return Value::Number(Number::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(f.to_string()))
}

/// Excel serial date (days since 1899-12-30) as `YYYY-MM-DD[ HH:MM:SS]`.
fn excel_serial_to_text(serial: f64) -> Option<String> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let total_secs = (serial * 86_400.0).round() as i64;
    let when = base.checked_add_signed(Duration::seconds(total_secs))?;
    if total_secs % 86_400 == 0 {
        Some(when.format("%Y-%m-%d").to_string())
    } else {
        Some(when.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => empty(),
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Number(Number::from(*i)),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            excel_serial_to_text(serial)
                .map(Value::String)
                .unwrap_or_else(|| float_value(serial))
        }
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(e) => Value::String(e.to_string()),
    }
}

/// CSV cells arrive as text; numbers and booleans are recognised.
/// Values with a leading zero (e.g. zip codes) stay text.
fn infer_scalar(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return empty();
    }

    let digits = trimmed.trim_start_matches('-');
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");

    if !leading_zero {
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Number(Number::from(i));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() && trimmed.chars().any(|c| c.is_ascii_digit()) {
                return float_value(f);
            }
        }
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(field.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Headers
// ─────────────────────────────────────────────────────────────────────────────

/// Makes header names non-empty and unique.
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|name| {
            let base = if name.trim().is_empty() {
                "__EMPTY".to_string()
            } else {
                name.trim().to_string()
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn rows_to_dataset(rows: Vec<Vec<Value>>) -> Dataset {
    let mut rows = rows
        .into_iter()
        .filter(|row| !row.iter().all(is_blank));

    let Some(header_row) = rows.next() else {
        return Dataset::default();
    };
    let data: Vec<Vec<Value>> = rows.collect();

    // Trailing blank cells are padding; the widest row sets the column count.
    let width = std::iter::once(&header_row)
        .chain(data.iter())
        .map(|row| row.iter().rposition(|v| !is_blank(v)).map_or(0, |i| i + 1))
        .max()
        .unwrap_or(0);
    let raw: Vec<String> = (0..width)
        .map(|i| {
            header_row
                .get(i)
                .map(crate::sheet::dataset::cell_text)
                .unwrap_or_default()
        })
        .collect();

    Dataset::from_cells(normalize_headers(&raw), data)
}
