use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::activity::{Activity, Status};
use crate::config::Config;
use crate::datetime::{format_due_date, parse_due_date, workdays_until};

/// One untyped spreadsheet cell as handed over by a workbook reader.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    format!("{}", *value as i64)
                } else {
                    value.to_string()
                }
            }
            CellValue::Bool(value) => value.to_string(),
            CellValue::Date(date) => format_due_date(*date),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

/// A row keyed by raw header text, in the sheet's column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.push((header.into(), value));
    }

    pub fn with(mut self, header: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push(header, value.into());
        self
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value)
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_blank())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<RawRow>,
}

/// A sheet as delivered by the reader. Unreadable sheets are skipped.
#[derive(Debug, Clone)]
pub enum SheetSource {
    Rows(RawSheet),
    Unreadable { name: String, reason: String },
}

impl SheetSource {
    pub fn name(&self) -> &str {
        match self {
            SheetSource::Rows(sheet) => &sheet.name,
            SheetSource::Unreadable { name, .. } => name,
        }
    }
}

/// Header aliases and status vocabulary driving column detection.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRules {
    pub title: Vec<String>,
    pub owner: Vec<String>,
    pub due_date: Vec<String>,
    pub note: Vec<String>,
    pub status: Vec<String>,
    pub total_time: Vec<String>,
    pub done_terms: Vec<String>,
    pub done_sheet_markers: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for IngestRules {
    fn default() -> Self {
        Self {
            title: owned(&["atividade", "atividades", "descrição", "description", "task"]),
            owner: owned(&["responsável", "responsavel", "owner", "assigned to"]),
            due_date: owned(&[
                "previsão de término",
                "previsao de termino",
                "prazo",
                "due date",
                "data final",
            ]),
            note: owned(&["observação", "observacao", "obs", "comments", "notas", "notes"]),
            status: owned(&["status", "situação", "situacao"]),
            total_time: owned(&["tempo total", "total time"]),
            done_terms: owned(&[
                "concluído",
                "concluido",
                "feito",
                "ok",
                "finalizado",
                "concluded",
                "done",
            ]),
            done_sheet_markers: owned(&["concluído", "concluido", "finalizado", "concluded", "done"]),
        }
    }
}

impl IngestRules {
    /// Defaults, with any `columns.*` / `status.*` list in the config replacing its table.
    pub fn from_config(cfg: &Config) -> Self {
        let mut rules = Self::default();
        let tables: [(&str, &mut Vec<String>); 8] = [
            ("columns.title", &mut rules.title),
            ("columns.owner", &mut rules.owner),
            ("columns.due", &mut rules.due_date),
            ("columns.note", &mut rules.note),
            ("columns.status", &mut rules.status),
            ("columns.total_time", &mut rules.total_time),
            ("status.done_terms", &mut rules.done_terms),
            ("status.done_sheet_markers", &mut rules.done_sheet_markers),
        ];
        for (key, table) in tables {
            if let Some(list) = cfg.get_list(key) {
                debug!(key, entries = list.len(), "ingest table overridden");
                *table = list;
            }
        }
        rules
    }
}

/// First header of `row`, in column order, matching any alias.
fn find_header<'r>(row: &'r RawRow, aliases: &[String]) -> Option<&'r str> {
    let wanted: Vec<String> = aliases.iter().map(|alias| alias.trim().to_lowercase()).collect();
    row.headers()
        .find(|header| !header.is_empty() && wanted.contains(&header.trim().to_lowercase()))
}

fn field_text(row: &RawRow, aliases: &[String]) -> Option<String> {
    find_header(row, aliases).map(|header| row.get(header).map(CellValue::as_text).unwrap_or_default())
}

pub fn resolve_status(raw: &str, sheet_name: &str, rules: &IngestRules) -> Status {
    let value = raw.trim().to_lowercase();
    let sheet = sheet_name.to_lowercase();

    let sheet_says_done = value.is_empty()
        && rules
            .done_sheet_markers
            .iter()
            .any(|marker| sheet.contains(&marker.to_lowercase()));
    let cell_says_done = !value.is_empty()
        && rules
            .done_terms
            .iter()
            .any(|term| value.contains(&term.to_lowercase()));

    if sheet_says_done || cell_says_done {
        Status::Done
    } else {
        Status::Pending
    }
}

fn sanitize_sheet_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub activities: Vec<Activity>,
    pub skipped_sheets: Vec<String>,
}

/// Normalizes every row of every readable sheet into an [`Activity`],
/// preserving order within and across sheets.
#[tracing::instrument(skip(sheets, rules), fields(sheets = sheets.len()))]
pub fn ingest(sheets: &[SheetSource], rules: &IngestRules, today: NaiveDate) -> Ingested {
    let mut out = Ingested::default();
    let mut issued: HashSet<String> = HashSet::new();

    for source in sheets {
        let sheet = match source {
            SheetSource::Rows(sheet) => sheet,
            SheetSource::Unreadable { name, reason } => {
                warn!(sheet = %name, reason = %reason, "skipping unreadable sheet");
                out.skipped_sheets.push(name.clone());
                continue;
            }
        };

        let prefix = sanitize_sheet_name(&sheet.name);
        for (index, row) in sheet.rows.iter().enumerate() {
            let mut id = format!("{prefix}-{index}");
            let mut suffix = 2;
            while issued.contains(&id) {
                id = format!("{prefix}-{index}-{suffix}");
                suffix += 1;
            }
            issued.insert(id.clone());

            let status_raw = field_text(row, &rules.status).unwrap_or_default();
            let due_date = find_header(row, &rules.due_date)
                .and_then(|header| row.get(header))
                .and_then(parse_due_date);

            out.activities.push(Activity {
                id,
                source_sheet: sheet.name.clone(),
                title: field_text(row, &rules.title).unwrap_or_else(|| format!("Item {}", index + 1)),
                owner: field_text(row, &rules.owner).unwrap_or_default(),
                note: field_text(row, &rules.note).unwrap_or_default(),
                total_time: field_text(row, &rules.total_time).unwrap_or_default(),
                status: resolve_status(&status_raw, &sheet.name, rules),
                due_date,
                workdays_until_due: due_date.map(|due| workdays_until(today, due)),
                kanban_category: None,
            });
        }

        debug!(sheet = %sheet.name, rows = sheet.rows.len(), "processed sheet");
    }

    info!(
        activities = out.activities.len(),
        skipped = out.skipped_sheets.len(),
        "ingestion finished"
    );
    out
}
