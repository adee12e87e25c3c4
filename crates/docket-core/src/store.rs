use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::activity::{Activity, KanbanColumn, Status};
use crate::filter::ActivityFilter;
use crate::slot::StateSlot;
use crate::tools::{ManualItem, Tool, ToolState, ToolStates};

/// Bucket label for activities without an owner in per-owner breakdowns.
pub const UNASSIGNED_OWNER: &str = "Unassigned";

pub const NO_FILE: &str = "No file loaded.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMeta {
    #[serde(default)]
    pub sheet_names: Vec<String>,
    #[serde(default = "DatasetMeta::no_file")]
    pub file_name: String,
}

impl Default for DatasetMeta {
    fn default() -> Self {
        Self {
            sheet_names: vec![],
            file_name: Self::no_file(),
        }
    }
}

impl DatasetMeta {
    fn no_file() -> String {
        NO_FILE.to_string()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    activities: Vec<Activity>,
    #[serde(default)]
    dataset_meta: DatasetMeta,
    #[serde(default)]
    tool_states: ToolStates,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub done: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: Status) {
        match status {
            Status::Pending => self.pending += 1,
            Status::Done => self.done += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub owner_count: usize,
    pub status: StatusCounts,
    pub with_note: usize,
    pub without_note: usize,
    pub by_owner: BTreeMap<String, StatusCounts>,
}

/// Pending activities split by board column. `done` is always empty:
/// completed activities leave the board.
#[derive(Debug, Default)]
pub struct KanbanView<'a> {
    pub todo: Vec<&'a Activity>,
    pub in_progress: Vec<&'a Activity>,
    pub done: Vec<&'a Activity>,
}

#[derive(Debug)]
pub struct AppState<S: StateSlot> {
    slot: S,
    activities: Vec<Activity>,
    filtered: Vec<usize>,
    filter: ActivityFilter,
    meta: DatasetMeta,
    tools: ToolStates,
}

impl<S: StateSlot> AppState<S> {
    pub fn new(slot: S) -> Self {
        Self {
            slot,
            activities: vec![],
            filtered: vec![],
            filter: ActivityFilter::default(),
            meta: DatasetMeta::default(),
            tools: ToolStates::default(),
        }
    }

    /// Builds a store and fills it from the slot, recomputing workday
    /// distances against `today`.
    pub fn restore(slot: S, today: NaiveDate) -> Self {
        let mut state = Self::new(slot);
        state.restore_in_place(today);
        state
    }

    /// Returns whether a saved state was loaded. A corrupt payload clears
    /// the slot and leaves the store empty.
    #[tracing::instrument(skip(self), fields(key = self.slot.key()))]
    pub fn restore_in_place(&mut self, today: NaiveDate) -> bool {
        let raw = match self.slot.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("no saved state found");
                self.clear_memory();
                return false;
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed reading saved state");
                self.clear_memory();
                return false;
            }
        };

        let parsed = match serde_json::from_str::<PersistedState>(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                error!(error = %err, "saved state is corrupt; clearing slot");
                if let Err(clear_err) = self.slot.clear() {
                    error!(error = %format!("{clear_err:#}"), "failed clearing corrupt slot");
                }
                self.clear_memory();
                return false;
            }
        };

        self.activities = parsed.activities;
        for activity in &mut self.activities {
            if !activity.is_pending() {
                activity.kanban_category = None;
            }
            activity.refresh_workdays(today);
        }
        self.meta = parsed.dataset_meta;
        self.tools = parsed.tool_states;
        self.tools.normalize();
        self.filter = ActivityFilter::default();
        self.refilter();

        info!(
            activities = self.activities.len(),
            file = %self.meta.file_name,
            "restored saved state"
        );
        true
    }

    /// Best-effort write of the whole state. Failures are logged only.
    #[tracing::instrument(skip(self), fields(key = self.slot.key()))]
    pub fn persist(&self) -> bool {
        let snapshot = PersistedState {
            activities: self.activities.clone(),
            dataset_meta: self.meta.clone(),
            tool_states: self.tools.clone(),
        };
        let result = serde_json::to_string(&snapshot)
            .map_err(anyhow::Error::from)
            .and_then(|payload| self.slot.write(&payload));
        match result {
            Ok(()) => {
                debug!("state saved");
                true
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed saving state");
                false
            }
        }
    }

    /// Clears the slot and returns to an empty store.
    #[tracing::instrument(skip(self))]
    pub fn reset(&mut self) {
        if let Err(err) = self.slot.clear() {
            error!(error = %format!("{err:#}"), "failed clearing slot");
        }
        self.clear_memory();
        info!("state reset");
    }

    fn clear_memory(&mut self) {
        self.activities.clear();
        self.filtered.clear();
        self.filter = ActivityFilter::default();
        self.meta = DatasetMeta::default();
        self.tools = ToolStates::default();
    }

    /// Replaces the activity collection with a freshly ingested one.
    #[tracing::instrument(skip(self, activities), fields(count = activities.len()))]
    pub fn load_dataset(&mut self, activities: Vec<Activity>, meta: DatasetMeta) {
        self.activities = activities;
        self.meta = meta;
        self.refilter();
        info!(file = %self.meta.file_name, "dataset loaded");
        self.persist();
    }

    pub fn refresh_workdays(&mut self, today: NaiveDate) {
        for activity in &mut self.activities {
            activity.refresh_workdays(today);
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn apply_filters(&mut self, filter: ActivityFilter) {
        self.filter = filter;
        self.refilter();
    }

    fn refilter(&mut self) {
        self.filtered = self
            .activities
            .iter()
            .enumerate()
            .filter(|(_, activity)| self.filter.matches(activity))
            .map(|(idx, _)| idx)
            .collect();
        debug!(
            total = self.activities.len(),
            visible = self.filtered.len(),
            "filtered view derived"
        );
    }

    pub fn active_filter(&self) -> &ActivityFilter {
        &self.filter
    }

    pub fn dataset_meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn filtered(&self) -> Vec<&Activity> {
        self.filtered.iter().map(|idx| &self.activities[*idx]).collect()
    }

    pub fn find_activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.id == id)
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats::default();
        let mut owners = BTreeSet::new();

        for activity in self.filtered() {
            stats.total += 1;
            stats.status.bump(activity.status);
            if activity.has_note() {
                stats.with_note += 1;
            }
            if !activity.owner.is_empty() {
                owners.insert(activity.owner.as_str());
            }
            let bucket = if activity.owner.is_empty() {
                UNASSIGNED_OWNER.to_string()
            } else {
                activity.owner.clone()
            };
            stats.by_owner.entry(bucket).or_default().bump(activity.status);
        }

        stats.owner_count = owners.len();
        stats.without_note = stats.total - stats.with_note;
        stats
    }

    pub fn kanban_view(&self) -> KanbanView<'_> {
        let mut view = KanbanView::default();
        for activity in self.filtered() {
            match activity.kanban_column() {
                Some(KanbanColumn::Todo) => view.todo.push(activity),
                Some(KanbanColumn::InProgress) => view.in_progress.push(activity),
                None => {}
            }
        }
        view
    }

    /// Sets status and board column of one activity. The column is kept
    /// only for pending activities. Returns whether anything changed.
    #[tracing::instrument(skip(self))]
    pub fn set_activity_status(&mut self, id: &str, status: Status, column: Option<KanbanColumn>) -> bool {
        let Some(activity) = self.activities.iter_mut().find(|activity| activity.id == id) else {
            warn!(id, "activity not found");
            return false;
        };

        let column = match status {
            Status::Pending => column,
            Status::Done => None,
        };
        let changed = activity.status != status || activity.kanban_category != column;
        activity.status = status;
        activity.kanban_category = column;

        if changed {
            info!(id, ?status, ?column, "activity status updated");
            self.refilter();
            self.persist();
        }
        changed
    }

    pub fn tool_state(&self, tool: Tool) -> &ToolState {
        self.tools.get(tool)
    }

    /// `(category key, label, items)` in display order.
    pub fn tool_view(&self, tool: Tool) -> Vec<(&'static str, &'static str, &[ManualItem])> {
        let state = self.tools.get(tool);
        tool.categories()
            .iter()
            .map(|(key, label)| (*key, *label, state.items(key)))
            .collect()
    }

    #[tracing::instrument(skip(self, text, now))]
    pub fn add_item(&mut self, tool: Tool, category: &str, text: &str, now: DateTime<Utc>) -> Option<String> {
        let id = self.tools.get_mut(tool).add(tool, category, text, now)?;
        info!(tool = tool.key(), category, id = %id, "item added");
        self.persist();
        Some(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn remove_item(&mut self, tool: Tool, category: &str, id: &str) -> bool {
        if !self.tools.get_mut(tool).remove(category, id) {
            warn!(tool = tool.key(), category, id, "item not found for removal");
            return false;
        }
        info!(tool = tool.key(), category, id, "item removed");
        self.persist();
        true
    }

    /// Edits the text of an item wherever it lives in `tool`. Blank text
    /// is rejected.
    #[tracing::instrument(skip(self, text))]
    pub fn update_item(&mut self, tool: Tool, id: &str, text: &str) -> bool {
        if text.trim().is_empty() {
            warn!(tool = tool.key(), id, "rejecting blank item text");
            return false;
        }
        match self.tools.get_mut(tool).update(id, text) {
            Some(true) => {
                info!(tool = tool.key(), id, "item updated");
                self.persist();
                true
            }
            Some(false) => {
                debug!(tool = tool.key(), id, "item text unchanged");
                true
            }
            None => {
                warn!(tool = tool.key(), id, "item not found for update");
                false
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn move_item(&mut self, tool: Tool, id: &str, target: &str) -> bool {
        if !self.tools.get_mut(tool).move_to(tool, id, target) {
            warn!(tool = tool.key(), id, target, "item not moved");
            return false;
        }
        info!(tool = tool.key(), id, target, "item moved");
        self.persist();
        true
    }

    /// Distinct non-empty owners across the full collection, sorted.
    pub fn unique_owners(&self) -> Vec<String> {
        self.activities
            .iter()
            .filter(|activity| !activity.owner.is_empty())
            .map(|activity| activity.owner.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Filtered activities due in the given month.
    pub fn activities_for_month(&self, year: i32, month: u32) -> Vec<&Activity> {
        self.filtered()
            .into_iter()
            .filter(|activity| {
                activity
                    .due_date
                    .is_some_and(|due| due.year() == year && due.month() == month)
            })
            .collect()
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }
}
