use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use tracing::{debug, info, warn};

use crate::datetime::serial_to_date;
use crate::ingest::{CellValue, RawRow, RawSheet, SheetSource};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Everything read from one picked file, before normalization.
#[derive(Debug, Clone)]
pub struct LoadedWorkbook {
    pub file_name: String,
    pub sheet_names: Vec<String>,
    pub sheets: Vec<SheetSource>,
}

/// UTF-8 unless that shows no accented letters while a Latin-1 reading
/// of the same bytes does.
pub fn decode_delimited_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let accented = |c: char| ('\u{00C0}'..='\u{017F}').contains(&c);
    let utf8 = String::from_utf8_lossy(bytes);
    if std::str::from_utf8(bytes).is_ok() && utf8.chars().any(accented) {
        debug!("decoded delimited text as utf-8");
        return utf8.into_owned();
    }
    let latin1: String = bytes.iter().map(|&b| char::from(b)).collect();
    if latin1.chars().any(accented) && !utf8.chars().any(accented) {
        debug!("decoded delimited text as latin-1");
        return latin1;
    }
    utf8.into_owned()
}

fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[tracing::instrument(fields(path = %path.display()))]
pub fn load_workbook(path: &Path) -> anyhow::Result<LoadedWorkbook> {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let sheets = match ext.as_str() {
        "csv" | "tsv" | "txt" => vec![read_delimited(path, ext == "tsv")?],
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(path)?,
        other => return Err(anyhow!("unsupported file type: {other:?}")),
    };

    let loaded = LoadedWorkbook {
        file_name: file_name_of(path),
        sheet_names: sheets.iter().map(|sheet| sheet.name().to_string()).collect(),
        sheets,
    };
    info!(sheets = ?loaded.sheet_names, "workbook read");
    Ok(loaded)
}

fn read_delimited(path: &Path, tab_separated: bool) -> anyhow::Result<SheetSource> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = decode_delimited_text(&bytes);
    let delimiter = if tab_separated { b'\t' } else { detect_delimiter(&text) };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read CSV headers: {}", path.display()))?
        .clone();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed parsing {} record {}", path.display(), idx + 1))?;
        let mut row = RawRow::new();
        for (col, header) in headers.iter().enumerate() {
            row.push(header, CellValue::from(record.get(col).unwrap_or_default()));
        }
        if !row.is_blank() {
            rows.push(row);
        }
    }

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "Sheet1".to_string());
    debug!(sheet = %name, rows = rows.len(), delimiter = %char::from(delimiter), "read delimited sheet");
    Ok(SheetSource::Rows(RawSheet { name, rows }))
}

fn read_spreadsheet(path: &Path) -> anyhow::Result<Vec<SheetSource>> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("failed to open workbook: {}", path.display()))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let mut iter = range.rows();
                let headers: Vec<String> = iter
                    .next()
                    .map(|header| header.iter().map(|cell| cell_to_value(cell).as_text()).collect())
                    .unwrap_or_default();
                let rows: Vec<RawRow> = iter
                    .map(|cells| {
                        let mut row = RawRow::new();
                        for (header, cell) in headers.iter().zip(cells) {
                            row.push(header.clone(), cell_to_value(cell));
                        }
                        row
                    })
                    .filter(|row| !row.is_blank())
                    .collect();
                debug!(sheet = %name, rows = rows.len(), "read worksheet");
                sheets.push(SheetSource::Rows(RawSheet { name, rows }));
            }
            Err(err) => {
                warn!(sheet = %name, error = %err, "failed reading worksheet");
                sheets.push(SheetSource::Unreadable {
                    name,
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(sheets)
}

fn cell_to_value(cell: &Data) -> CellValue {
    match cell {
        Data::String(v) => CellValue::from(v.as_str()),
        Data::Float(v) => CellValue::Number(*v),
        Data::Int(v) => CellValue::Number(*v as f64),
        Data::Bool(v) => CellValue::Bool(*v),
        Data::DateTime(v) => serial_to_date(v.as_f64())
            .map(CellValue::Date)
            .unwrap_or(CellValue::Empty),
        Data::DateTimeIso(v) => v
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(v.clone())),
        Data::DurationIso(v) => CellValue::Text(v.clone()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}
