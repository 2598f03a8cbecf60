use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

/// A single spreadsheet cell, reduced to the shapes the importer cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Blank,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl RawCell {
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Blank => true,
            RawCell::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text form of the cell, `None` when blank.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RawCell::Blank => None,
            RawCell::Text(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            RawCell::Int(value) => Some(value.to_string()),
            RawCell::Float(value) => Some(format_float(*value)),
            RawCell::Bool(value) => Some(value.to_string()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RawCell::Int(value) => Some(*value),
            RawCell::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                Some(*value as i64)
            }
            RawCell::Text(value) => {
                let trimmed = value.trim();
                trimmed.parse::<i64>().ok().or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|parsed| parsed.is_finite() && parsed.fract() == 0.0)
                        .map(|parsed| parsed as i64)
                })
            }
            _ => None,
        }
    }
}

impl From<&Data> for RawCell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty | Data::Error(_) => RawCell::Blank,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                RawCell::Text(s.clone())
            }
            Data::Int(n) => RawCell::Int(*n),
            Data::Float(n) => RawCell::Float(*n),
            Data::Bool(b) => RawCell::Bool(*b),
            Data::DateTime(dt) => RawCell::Float(dt.as_f64()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<RawCell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<RawCell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// Loads every sheet of a workbook in document order.
///
/// `.csv` files are read as a single sheet named after the file stem; every
/// other extension goes through calamine's format detection.
pub fn read_workbook<P: AsRef<Path>>(path: P) -> AppResult<Vec<Sheet>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AppError::Path(format!(
            "spreadsheet not found at {}",
            path.display()
        )));
    }

    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    let sheets = if is_csv {
        vec![read_csv_sheet(path)?]
    } else {
        read_calamine_sheets(path)?
    };

    info!(
        target: "sheet_reader",
        path = %path.display(),
        sheets = sheets.len(),
        "workbook loaded"
    );
    Ok(sheets)
}

fn read_calamine_sheets(path: &Path) -> AppResult<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook.worksheet_range(&name)?;
        let rows = range_to_rows(&range);
        debug!(target: "sheet_reader", sheet = %name, rows = rows.len(), "sheet read");
        sheets.push(Sheet::new(name, rows));
    }
    Ok(sheets)
}

/// Calamine trims leading empty rows and columns off a range; pad them back so
/// column indices stay absolute.
fn range_to_rows(range: &Range<Data>) -> Vec<Vec<RawCell>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };

    let mut rows: Vec<Vec<RawCell>> = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells = vec![RawCell::Blank; start_col as usize];
        cells.extend(row.iter().map(RawCell::from));
        rows.push(cells);
    }
    rows
}

fn read_csv_sheet(path: &Path) -> AppResult<Sheet> {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .ok_or_else(|| AppError::Path(format!("invalid csv path: {}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(csv_cell).collect());
    }
    Ok(Sheet::new(name, rows))
}

/// CSV cells stay text; numeric columns are parsed where they are consumed.
fn csv_cell(value: &str) -> RawCell {
    if value.trim().is_empty() {
        RawCell::Blank
    } else {
        RawCell::Text(value.to_string())
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
