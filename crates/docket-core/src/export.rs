use std::path::Path;

use anyhow::{Context, anyhow};
use rust_xlsxwriter::{Format, Workbook};
use tracing::{debug, info};

use crate::datetime::format_due_date;
use crate::slot::StateSlot;
use crate::store::AppState;
use crate::tools::Tool;

/// A named table handed to a spreadsheet writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn tool_headers(tool: Tool) -> Vec<String> {
    match tool {
        Tool::PriorityMatrix => headers(&["Quadrant", "Item"]),
        Tool::ProsCons => headers(&["Type", "Item"]),
        Tool::Planner => headers(&["Category", "Task"]),
    }
}

/// Activities sheet plus one sheet per non-empty tool. Internal fields
/// (id, source sheet, board column) are left out.
#[tracing::instrument(skip(state))]
pub fn build_sheets<S: StateSlot>(state: &AppState<S>) -> Vec<ExportSheet> {
    let mut sheets = Vec::new();

    if !state.activities().is_empty() {
        let rows = state
            .activities()
            .iter()
            .map(|activity| {
                vec![
                    activity.status.label().to_string(),
                    activity.title.clone(),
                    activity.owner.clone(),
                    activity.due_date.map(format_due_date).unwrap_or_default(),
                    activity
                        .workdays_until_due
                        .map(|days| days.to_string())
                        .unwrap_or_default(),
                    activity.total_time.clone(),
                    activity.note.clone(),
                ]
            })
            .collect();
        sheets.push(ExportSheet {
            name: "Activities".to_string(),
            headers: headers(&["Status", "Activity", "Owner", "Due Date", "Workdays", "Total Time", "Note"]),
            rows,
        });
    }

    for tool in Tool::ALL {
        let rows: Vec<Vec<String>> = state
            .tool_view(tool)
            .into_iter()
            .flat_map(|(_, label, items)| items.iter().map(move |item| vec![label.to_string(), item.text.clone()]))
            .collect();
        if rows.is_empty() {
            debug!(tool = tool.key(), "nothing to export");
            continue;
        }
        sheets.push(ExportSheet {
            name: tool.title().to_string(),
            headers: tool_headers(tool),
            rows,
        });
    }

    sheets
}

#[tracing::instrument(skip(sheets), fields(path = %path.display(), sheets = sheets.len()))]
pub fn write_xlsx(path: &Path, sheets: &[ExportSheet]) -> anyhow::Result<()> {
    if sheets.is_empty() {
        return Err(anyhow!("nothing to export"));
    }

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet.name)
            .with_context(|| format!("invalid sheet name: {}", sheet.name))?;
        for (col, header) in sheet.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &bold)?;
        }
        for (row_idx, row) in sheet.rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                worksheet.write_string(row_idx as u32 + 1, col as u16, cell)?;
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing {}", path.display()))?;
    info!("export written");
    Ok(())
}
