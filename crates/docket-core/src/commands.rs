use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::activity::{KanbanColumn, Status};
use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::project_today;
use crate::export;
use crate::filter::ActivityFilter;
use crate::ingest::{IngestRules, ingest};
use crate::render::Renderer;
use crate::slot::StateSlot;
use crate::store::{AppState, DatasetMeta};
use crate::tools::Tool;
use crate::workbook::load_workbook;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "import", "list", "stats", "kanban", "owners", "sheets", "calendar", "status", "tool", "export", "reset",
        "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(state, cfg, renderer, inv))]
pub fn dispatch<S: StateSlot>(
    state: &mut AppState<S>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();
    let args = inv.command_args.as_slice();

    debug!(command, args = ?args, "dispatching command");

    match command {
        "import" => cmd_import(state, cfg, args, now),
        "list" => cmd_list(state, renderer, args),
        "stats" => cmd_stats(state, renderer, args),
        "kanban" => cmd_kanban(state, renderer, args),
        "owners" => renderer.print_lines(state.unique_owners()),
        "sheets" => cmd_sheets(state, renderer),
        "calendar" => cmd_calendar(state, renderer, args),
        "status" => cmd_status(state, args),
        "tool" => cmd_tool(state, renderer, args, now),
        "export" => cmd_export(state, args),
        "reset" => {
            state.reset();
            println!("State cleared.");
            Ok(())
        }
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(state, cfg, args, now))]
fn cmd_import<S: StateSlot>(
    state: &mut AppState<S>,
    cfg: &Config,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let [path] = args else {
        return Err(anyhow!("usage: import FILE"));
    };
    info!(file = %path, "command import");

    // The current dataset stays as restored when the file cannot be read.
    let loaded = load_workbook(Path::new(path)).with_context(|| format!("could not read file {path}"))?;
    let rules = IngestRules::from_config(cfg);
    let ingested = ingest(&loaded.sheets, &rules, project_today(now));

    for skipped in &ingested.skipped_sheets {
        warn!(sheet = %skipped, "sheet skipped during import");
        eprintln!("warning: could not process sheet {skipped:?}");
    }

    let count = ingested.activities.len();
    state.load_dataset(
        ingested.activities,
        DatasetMeta {
            sheet_names: loaded.sheet_names,
            file_name: loaded.file_name,
        },
    );
    println!(
        "Imported {count} activities from {} ({} sheets).",
        state.dataset_meta().file_name,
        state.dataset_meta().sheet_names.len()
    );
    Ok(())
}

fn cmd_list<S: StateSlot>(state: &mut AppState<S>, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    state.apply_filters(ActivityFilter::parse(args)?);
    renderer.print_activity_table(&state.filtered())
}

fn cmd_stats<S: StateSlot>(state: &mut AppState<S>, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    state.apply_filters(ActivityFilter::parse(args)?);
    renderer.print_stats(&state.stats())
}

fn cmd_kanban<S: StateSlot>(state: &mut AppState<S>, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    state.apply_filters(ActivityFilter::parse(args)?);
    renderer.print_kanban(&state.kanban_view())
}

fn cmd_sheets<S: StateSlot>(state: &AppState<S>, renderer: &mut Renderer) -> anyhow::Result<()> {
    let meta = state.dataset_meta();
    renderer.print_lines(std::iter::once(meta.file_name.clone()).chain(meta.sheet_names.iter().map(|name| format!("  {name}"))))
}

fn parse_month(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM, got: {raw}"))
}

fn cmd_calendar<S: StateSlot>(
    state: &mut AppState<S>,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let Some((month, filters)) = args.split_first() else {
        return Err(anyhow!("usage: calendar YYYY-MM [filters]"));
    };
    let month = parse_month(month)?;
    state.apply_filters(ActivityFilter::parse(filters)?);
    renderer.print_activity_table(&state.activities_for_month(month.year(), month.month()))
}

#[instrument(skip(state, args))]
fn cmd_status<S: StateSlot>(state: &mut AppState<S>, args: &[String]) -> anyhow::Result<()> {
    let (id, status, column) = match args {
        [id, status] => (id, status, None),
        [id, status, column] => (id, status, Some(column)),
        _ => return Err(anyhow!("usage: status ID pending|done [todo|inprogress]")),
    };
    let status = Status::parse(status).ok_or_else(|| anyhow!("invalid status: {status}"))?;
    let column = match column {
        Some(raw) => Some(KanbanColumn::parse(raw).ok_or_else(|| anyhow!("invalid kanban column: {raw}"))?),
        None => None,
    };

    if state.set_activity_status(id, status, column) {
        println!("Activity {id} updated.");
    } else {
        println!("No change for {id}.");
    }
    Ok(())
}

fn report(changed: bool) {
    if changed {
        println!("Done.");
    } else {
        println!("No matching item; nothing changed.");
    }
}

#[instrument(skip(state, renderer, args, now))]
fn cmd_tool<S: StateSlot>(
    state: &mut AppState<S>,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let Some((tool_name, rest)) = args.split_first() else {
        return Err(anyhow!("usage: tool matrix|proscons|planner [list|add|remove|edit|move] ..."));
    };
    let tool = Tool::parse(tool_name).ok_or_else(|| anyhow!("unknown tool: {tool_name}"))?;
    let (action, rest) = match rest.split_first() {
        Some((action, rest)) => (action.as_str(), rest),
        None => ("list", rest),
    };

    match (action, rest) {
        ("list", []) => renderer.print_tool(tool, &state.tool_view(tool)),
        ("add", [category, words @ ..]) if !words.is_empty() => {
            match state.add_item(tool, category, &words.join(" "), now) {
                Some(id) => println!("Added {id}."),
                None => println!("Nothing added."),
            }
            Ok(())
        }
        ("remove", [category, id]) => {
            report(state.remove_item(tool, category, id));
            Ok(())
        }
        ("edit", [id, words @ ..]) if !words.is_empty() => {
            report(state.update_item(tool, id, &words.join(" ")));
            Ok(())
        }
        ("move", [id, target]) => {
            report(state.move_item(tool, id, target));
            Ok(())
        }
        _ => Err(anyhow!(
            "usage: tool {} [list | add CATEGORY TEXT | remove CATEGORY ID | edit ID TEXT | move ID CATEGORY]",
            tool_name
        )),
    }
}

#[instrument(skip(state, args))]
fn cmd_export<S: StateSlot>(state: &AppState<S>, args: &[String]) -> anyhow::Result<()> {
    let [path] = args else {
        return Err(anyhow!("usage: export FILE.xlsx"));
    };
    let sheets = export::build_sheets(state);
    export::write_xlsx(Path::new(path), &sheets).context("export failed")?;
    println!("Exported {} sheets to {path}.", sheets.len());
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "\
docket [-v|-q] [--rc KEY=VALUE] [--docketrc PATH] [--data DIR] COMMAND [ARGS]

  import FILE                     load a .csv/.xlsx/.ods file, replacing the dataset
  list [FILTERS]                  show activities
  stats [FILTERS]                 counts by status, note and owner
  kanban [FILTERS]                pending activities by board column
  owners                          distinct owners
  sheets                          loaded file and sheet names
  calendar YYYY-MM [FILTERS]      activities due in a month
  status ID pending|done [COL]    set status; COL is todo or inprogress
  tool TOOL [ACTION]              TOOL: matrix, proscons, planner
       list | add CAT TEXT | remove CAT ID | edit ID TEXT | move ID CAT
  export FILE.xlsx                write activities and tool lists
  reset                           clear saved state

FILTERS: sheet:NAME owner:NAME status:pending|done note:with|without"
    );
    Ok(())
}
