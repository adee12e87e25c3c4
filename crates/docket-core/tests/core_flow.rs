use std::fs;

use chrono::{NaiveDate, TimeZone, Utc};
use docket_core::activity::{KanbanColumn, Status};
use docket_core::export::{build_sheets, write_xlsx};
use docket_core::filter::ActivityFilter;
use docket_core::ingest::{IngestRules, RawRow, RawSheet, SheetSource, ingest};
use docket_core::slot::{FileSlot, MemorySlot, StateSlot};
use docket_core::store::{AppState, DatasetMeta, UNASSIGNED_OWNER};
use docket_core::tools::Tool;
use docket_core::workbook::load_workbook;
use tempfile::tempdir;

/// Slot whose writes always fail, like a full or read-only disk.
struct ReadOnlySlot;

impl StateSlot for ReadOnlySlot {
    fn key(&self) -> &str {
        "read_only"
    }

    fn read(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn write(&self, _payload: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("disk is read-only"))
    }

    fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).expect("valid date")
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).single().expect("valid now")
}

/// Five rows over two sheets: 3 pending, 2 done, owners Ana and Bia plus
/// one unassigned row.
fn fixture_sheets() -> Vec<SheetSource> {
    let open = RawSheet {
        name: "Open".to_string(),
        rows: vec![
            RawRow::new()
                .with("Atividade", "Draft budget")
                .with("Responsável", "Ana")
                .with("Prazo", "2026-10-19")
                .with("Status", "em andamento"),
            RawRow::new()
                .with("Atividade", "Call supplier")
                .with("Responsável", "Bia")
                .with("Prazo", "09/10/2026")
                .with("Observação", "waiting on quote"),
            RawRow::new()
                .with("Atividade", "Book room")
                .with("Responsável", "")
                .with("Prazo", ""),
        ],
    };
    let done = RawSheet {
        name: "Concluído".to_string(),
        rows: vec![
            RawRow::new()
                .with("Atividade", "Hire intern")
                .with("Responsável", "Ana")
                .with("Status", "")
                .with("Obs", "signed"),
            RawRow::new()
                .with("Atividade", "Order laptops")
                .with("Responsável", "Ana")
                .with("Status", "done")
                .with("Prazo", "2026-10-30"),
        ],
    };
    vec![SheetSource::Rows(open), SheetSource::Rows(done)]
}

fn loaded_state<S: StateSlot>(slot: S) -> AppState<S> {
    let mut state = AppState::new(slot);
    let ingested = ingest(&fixture_sheets(), &IngestRules::default(), wednesday());
    state.load_dataset(
        ingested.activities,
        DatasetMeta {
            sheet_names: vec!["Open".to_string(), "Concluído".to_string()],
            file_name: "fixture.xlsx".to_string(),
        },
    );
    state
}

#[test]
fn stats_over_fixture_match_manual_counts() {
    let state = loaded_state(MemorySlot::new("test"));
    let stats = state.stats();

    assert_eq!(stats.total, 5);
    assert_eq!(stats.owner_count, 2);
    assert_eq!(stats.status.pending, 3);
    assert_eq!(stats.status.done, 2);
    assert_eq!(stats.with_note, 2);
    assert_eq!(stats.without_note, 3);
    assert_eq!(stats.by_owner["Ana"].pending, 1);
    assert_eq!(stats.by_owner["Ana"].done, 2);
    assert_eq!(stats.by_owner["Bia"].pending, 1);
    assert_eq!(stats.by_owner[UNASSIGNED_OWNER].pending, 1);

    let overdue = state.find_activity("Open-1").expect("activity");
    assert_eq!(overdue.workdays_until_due, Some(-2));
}

#[test]
fn filtering_never_mutates_full_collection() {
    let mut state = loaded_state(MemorySlot::new("test"));
    let before = state.activities().to_vec();

    state.apply_filters(ActivityFilter::parse(&["owner:Ana".to_string()]).expect("filter"));
    assert_eq!(state.filtered().len(), 3);
    let stats = state.stats();
    assert_eq!(stats.owner_count, 1);
    assert_eq!(stats.status.done, 2);

    state.apply_filters(
        ActivityFilter::from_selectors(Some("Open"), Some("all"), Some("pending"), Some("with")).expect("filter"),
    );
    assert_eq!(
        state.filtered().iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
        vec!["Open-1"]
    );

    state.apply_filters(ActivityFilter::parse(&["note:without".to_string()]).expect("filter"));
    assert_eq!(state.filtered().len(), 3);

    state.apply_filters(ActivityFilter::default());
    assert_eq!(state.filtered().len(), 5);
    assert_eq!(state.activities(), before.as_slice());
}

#[test]
fn kanban_holds_only_pending_and_done_bucket_stays_empty() {
    let mut state = loaded_state(MemorySlot::new("test"));

    assert!(state.set_activity_status("Open-0", Status::Pending, Some(KanbanColumn::InProgress)));
    let view = state.kanban_view();
    assert_eq!(view.todo.len(), 2);
    assert_eq!(view.in_progress.len(), 1);
    assert!(view.done.is_empty());

    assert!(state.set_activity_status("Open-0", Status::Done, Some(KanbanColumn::InProgress)));
    let activity = state.find_activity("Open-0").expect("activity");
    assert_eq!(activity.status, Status::Done);
    assert_eq!(activity.kanban_category, None);
    let view = state.kanban_view();
    assert_eq!(view.todo.len() + view.in_progress.len(), 2);
    assert!(view.done.is_empty());
}

#[test]
fn status_change_reports_only_real_changes() {
    let slot = MemorySlot::new("test");
    let mut state = loaded_state(&slot);
    slot.clear().expect("clear");

    assert!(!state.set_activity_status("Open-2", Status::Pending, None));
    assert!(slot.peek().is_none(), "no-op must not persist");
    assert!(!state.set_activity_status("missing", Status::Done, None));

    state.apply_filters(ActivityFilter::parse(&["status:pending".to_string()]).expect("filter"));
    assert!(state.set_activity_status("Open-2", Status::Done, None));
    assert!(slot.peek().is_some());
    assert!(state.filtered().iter().all(|a| a.id != "Open-2"));
    assert_eq!(state.activities().len(), 5);
}

#[test]
fn tool_crud_and_move() {
    let mut state = AppState::new(MemorySlot::new("test"));

    assert_eq!(state.add_item(Tool::Planner, "unassigned", "  ", now()), None);
    assert_eq!(state.add_item(Tool::Planner, "pros", "wrong tool", now()), None);
    let a = state.add_item(Tool::Planner, "unassigned", "write report", now()).expect("added");
    let b = state.add_item(Tool::Planner, "unassigned", "send invoice", now()).expect("added");

    assert!(state.move_item(Tool::Planner, &b, "monday"));
    assert!(state.move_item(Tool::Planner, &a, "monday"));
    let monday = state.tool_state(Tool::Planner).items("monday");
    assert_eq!(monday.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec![a.as_str(), b.as_str()]);

    // Moving within the same category leaves one occurrence at the head.
    assert!(state.move_item(Tool::Planner, &b, "monday"));
    let monday = state.tool_state(Tool::Planner).items("monday");
    assert_eq!(monday.len(), 2);
    assert_eq!(monday[0].id, b);

    assert!(state.update_item(Tool::Planner, &a, "write final report"));
    assert!(state.update_item(Tool::Planner, &a, "write final report"));
    assert!(!state.update_item(Tool::Planner, &a, " "));
    assert!(!state.update_item(Tool::ProsCons, &a, "other tool"));
    assert!(!state.move_item(Tool::Planner, "missing", "friday"));

    assert!(!state.remove_item(Tool::Planner, "tuesday", &a));
    assert!(state.remove_item(Tool::Planner, "monday", &a));
    assert_eq!(state.tool_state(Tool::Planner).len(), 1);
    assert!(state.tool_state(Tool::PriorityMatrix).is_empty());
}

#[test]
fn corrupt_payload_resets_to_empty_and_clears_slot() {
    let slot = MemorySlot::with_payload("test", "{not json");
    let mut state = AppState::restore(&slot, wednesday());

    assert!(state.activities().is_empty());
    assert!(state.filtered().is_empty());
    assert_eq!(state.stats().total, 0);
    assert!(slot.peek().is_none());

    assert!(state.add_item(Tool::ProsCons, "pros", "still usable", now()).is_some());
    assert!(slot.peek().is_some());
}

#[test]
fn persist_then_restore_round_trips_through_file_slot() {
    let temp = tempdir().expect("tempdir");
    let slot = FileSlot::open(temp.path(), "docket_state_v1").expect("open slot");
    let mut state = loaded_state(slot);
    assert!(state.set_activity_status("Open-0", Status::Pending, Some(KanbanColumn::InProgress)));
    let id = state
        .add_item(Tool::PriorityMatrix, "important_urgent", "renew contract", now())
        .expect("added");
    state.add_item(Tool::ProsCons, "contras", "costly", now()).expect("added");

    let reopened = FileSlot::open(temp.path(), "docket_state_v1").expect("reopen slot");
    let restored = AppState::restore(reopened, wednesday());

    assert_eq!(restored.activities(), state.activities());
    assert_eq!(restored.dataset_meta(), state.dataset_meta());
    for tool in Tool::ALL {
        assert_eq!(restored.tool_state(tool), state.tool_state(tool));
    }
    assert_eq!(
        restored.find_activity("Open-0").and_then(|a| a.kanban_category),
        Some(KanbanColumn::InProgress)
    );
    assert_eq!(
        restored.tool_state(Tool::PriorityMatrix).category_of(&id),
        Some("important_urgent")
    );

    let raw = fs::read_to_string(temp.path().join("docket_state_v1.json")).expect("read slot");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(json["activities"][0]["dueDate"], "2026-10-19");
    assert_eq!(json["datasetMeta"]["fileName"], "fixture.xlsx");
    assert!(json["toolStates"]["planner"]["sunday"].is_array());
}

#[test]
fn different_state_key_orphans_saved_data() {
    let temp = tempdir().expect("tempdir");
    let slot = FileSlot::open(temp.path(), "docket_state_v1").expect("open slot");
    loaded_state(slot);

    let other = FileSlot::open(temp.path(), "docket_state_v2").expect("open slot");
    let restored = AppState::restore(other, wednesday());
    assert!(restored.activities().is_empty());
    assert!(FileSlot::open(temp.path(), "../escape").is_err());
}

#[test]
fn read_surface_helpers() {
    let state = loaded_state(MemorySlot::new("test"));

    assert_eq!(state.unique_owners(), vec!["Ana".to_string(), "Bia".to_string()]);
    let october = state.activities_for_month(2026, 10);
    assert_eq!(october.len(), 3);
    assert!(state.activities_for_month(2026, 11).is_empty());

    let view = state.tool_view(Tool::Planner);
    assert_eq!(view.len(), 8);
    assert_eq!(view[0].0, "unassigned");
    assert_eq!(view[7].1, "Sunday");
}

#[test]
fn failed_writes_keep_in_memory_changes() {
    let mut state = loaded_state(ReadOnlySlot);
    assert_eq!(state.activities().len(), 5);
    assert!(!state.persist());

    let id = state
        .add_item(Tool::ProsCons, "pros", "kept in memory", now())
        .expect("added despite failed write");
    assert_eq!(state.tool_state(Tool::ProsCons).len(), 1);

    assert!(state.move_item(Tool::ProsCons, &id, "contras"));
    assert_eq!(state.tool_state(Tool::ProsCons).category_of(&id), Some("contras"));

    assert!(state.set_activity_status("Open-0", Status::Done, None));
    assert_eq!(state.find_activity("Open-0").map(|a| a.status), Some(Status::Done));
    assert_eq!(state.stats().status.done, 3);
}

#[test]
fn reset_clears_slot_and_memory() {
    let slot = MemorySlot::new("test");
    let mut state = loaded_state(&slot);
    assert!(slot.peek().is_some());

    state.reset();
    assert!(slot.peek().is_none());
    assert!(state.activities().is_empty());
    assert_eq!(state.dataset_meta(), &DatasetMeta::default());
}

#[test]
fn export_sheets_strip_internal_fields() {
    let temp = tempdir().expect("tempdir");
    let mut state = loaded_state(MemorySlot::new("test"));
    state.add_item(Tool::Planner, "friday", "retro", now()).expect("added");

    let sheets = build_sheets(&state);
    let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Activities", "Weekly Planner"]);
    assert_eq!(sheets[0].rows.len(), 5);
    assert_eq!(sheets[0].rows[0][3], "19/10/2026");
    assert!(!sheets[0].headers.iter().any(|h| h == "ID"));
    assert_eq!(sheets[1].rows, vec![vec!["Friday".to_string(), "retro".to_string()]]);

    let path = temp.path().join("out.xlsx");
    write_xlsx(&path, &sheets).expect("write xlsx");
    assert!(path.exists());
    assert!(write_xlsx(&temp.path().join("empty.xlsx"), &[]).is_err());
}

#[test]
fn csv_file_imports_end_to_end() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("board.csv");
    fs::write(
        &path,
        b"Task,Owner,Due Date,Status\nShip release,Caio,21/10/2026,open\nFix login,Caio,2026-10-12,Done\nArchive mail,Caio,45658,open\n",
    )
    .expect("write csv");

    let loaded = load_workbook(&path).expect("load");
    let ingested = ingest(&loaded.sheets, &IngestRules::default(), wednesday());
    let mut state = AppState::new(MemorySlot::new("test"));
    state.load_dataset(
        ingested.activities,
        DatasetMeta {
            sheet_names: loaded.sheet_names,
            file_name: loaded.file_name,
        },
    );

    assert_eq!(state.dataset_meta().file_name, "board.csv");
    let ship = state.find_activity("board-0").expect("activity");
    assert_eq!(ship.status, Status::Pending);
    assert_eq!(ship.workdays_until_due, Some(5));
    let fix = state.find_activity("board-1").expect("activity");
    assert_eq!(fix.status, Status::Done);
    assert_eq!(fix.workdays_until_due, Some(-1));
    let archive = state.find_activity("board-2").expect("activity");
    assert_eq!(archive.due_date, NaiveDate::from_ymd_opt(2025, 1, 1));
}
