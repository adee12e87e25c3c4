use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// The three manual list tools. Each owns a fixed set of categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    PriorityMatrix,
    ProsCons,
    Planner,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::PriorityMatrix, Tool::ProsCons, Tool::Planner];

    pub fn key(self) -> &'static str {
        match self {
            Tool::PriorityMatrix => "priorityMatrix",
            Tool::ProsCons => "prosCons",
            Tool::Planner => "planner",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Tool::PriorityMatrix => "Priority Matrix",
            Tool::ProsCons => "Pros and Cons",
            Tool::Planner => "Weekly Planner",
        }
    }

    /// `(category key, human label)` in display order.
    pub fn categories(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Tool::PriorityMatrix => &[
                ("important_urgent", "Important & Urgent"),
                ("important_not_urgent", "Important & Not Urgent"),
                ("not_important_urgent", "Not Important & Urgent"),
                ("not_important_not_urgent", "Not Important & Not Urgent"),
            ],
            Tool::ProsCons => &[("pros", "Pros"), ("contras", "Cons")],
            Tool::Planner => &[
                ("unassigned", "Unassigned"),
                ("monday", "Monday"),
                ("tuesday", "Tuesday"),
                ("wednesday", "Wednesday"),
                ("thursday", "Thursday"),
                ("friday", "Friday"),
                ("saturday", "Saturday"),
                ("sunday", "Sunday"),
            ],
        }
    }

    pub fn has_category(self, category: &str) -> bool {
        self.categories().iter().any(|(key, _)| *key == category)
    }

    pub fn category_label(self, category: &str) -> Option<&'static str> {
        self.categories()
            .iter()
            .find(|(key, _)| *key == category)
            .map(|(_, label)| *label)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "matrix" | "prioritymatrix" | "priority" | "eisenhower" => Some(Tool::PriorityMatrix),
            "proscons" | "pros" | "pros-cons" => Some(Tool::ProsCons),
            "planner" | "week" | "weekly" => Some(Tool::Planner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManualItem {
    pub id: String,
    pub text: String,
}

/// Category key to ordered items. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ToolState {
    categories: BTreeMap<String, Vec<ManualItem>>,
}

impl ToolState {
    pub fn new(tool: Tool) -> Self {
        let categories = tool
            .categories()
            .iter()
            .map(|(key, _)| (key.to_string(), Vec::new()))
            .collect();
        Self { categories }
    }

    /// Adds any missing category of `tool` and drops foreign ones.
    pub fn normalize(&mut self, tool: Tool) {
        self.categories.retain(|key, items| {
            let known = tool.has_category(key);
            if !known {
                warn!(tool = tool.key(), category = %key, dropped = items.len(), "dropping unknown category");
            }
            known
        });
        for (key, _) in tool.categories() {
            self.categories.entry(key.to_string()).or_default();
        }
    }

    pub fn items(&self, category: &str) -> &[ManualItem] {
        self.categories.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn category_of(&self, id: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(_, items)| items.iter().any(|item| item.id == id))
            .map(|(key, _)| key.as_str())
    }

    fn contains_id(&self, id: &str) -> bool {
        self.category_of(id).is_some()
    }

    pub(crate) fn add(&mut self, tool: Tool, category: &str, text: &str, now: DateTime<Utc>) -> Option<String> {
        if text.trim().is_empty() {
            debug!(tool = tool.key(), "rejecting blank item");
            return None;
        }
        if !tool.has_category(category) {
            warn!(tool = tool.key(), category, "unknown category");
            return None;
        }

        let base = format!("manual-{}-{}", tool.key(), now.timestamp_millis());
        let mut id = base.clone();
        let mut suffix = 2;
        while self.contains_id(&id) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }

        self.categories.entry(category.to_string()).or_default().push(ManualItem {
            id: id.clone(),
            text: text.to_string(),
        });
        Some(id)
    }

    pub(crate) fn remove(&mut self, category: &str, id: &str) -> bool {
        let Some(items) = self.categories.get_mut(category) else {
            return false;
        };
        let before = items.len();
        items.retain(|item| item.id != id);
        items.len() < before
    }

    /// `Some(true)` when the text changed, `Some(false)` when it was identical.
    pub(crate) fn update(&mut self, id: &str, text: &str) -> Option<bool> {
        let item = self
            .categories
            .values_mut()
            .flat_map(|items| items.iter_mut())
            .find(|item| item.id == id)?;
        if item.text == text {
            return Some(false);
        }
        item.text = text.to_string();
        Some(true)
    }

    /// Removes the item from its category and puts it at the head of `target`.
    pub(crate) fn move_to(&mut self, tool: Tool, id: &str, target: &str) -> bool {
        if !tool.has_category(target) {
            warn!(tool = tool.key(), target, "unknown target category");
            return false;
        }
        let mut taken = None;
        for items in self.categories.values_mut() {
            if let Some(pos) = items.iter().position(|item| item.id == id) {
                taken = Some(items.remove(pos));
                break;
            }
        }
        let Some(item) = taken else {
            return false;
        };
        self.categories.entry(target.to_string()).or_default().insert(0, item);
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolStates {
    #[serde(default = "ToolStates::empty_matrix")]
    pub priority_matrix: ToolState,
    #[serde(default = "ToolStates::empty_pros_cons")]
    pub pros_cons: ToolState,
    #[serde(default = "ToolStates::empty_planner")]
    pub planner: ToolState,
}

impl Default for ToolStates {
    fn default() -> Self {
        Self {
            priority_matrix: Self::empty_matrix(),
            pros_cons: Self::empty_pros_cons(),
            planner: Self::empty_planner(),
        }
    }
}

impl ToolStates {
    fn empty_matrix() -> ToolState {
        ToolState::new(Tool::PriorityMatrix)
    }

    fn empty_pros_cons() -> ToolState {
        ToolState::new(Tool::ProsCons)
    }

    fn empty_planner() -> ToolState {
        ToolState::new(Tool::Planner)
    }

    pub fn get(&self, tool: Tool) -> &ToolState {
        match tool {
            Tool::PriorityMatrix => &self.priority_matrix,
            Tool::ProsCons => &self.pros_cons,
            Tool::Planner => &self.planner,
        }
    }

    pub fn get_mut(&mut self, tool: Tool) -> &mut ToolState {
        match tool {
            Tool::PriorityMatrix => &mut self.priority_matrix,
            Tool::ProsCons => &mut self.pros_cons,
            Tool::Planner => &mut self.planner,
        }
    }

    pub fn normalize(&mut self) {
        for tool in Tool::ALL {
            self.get_mut(tool).normalize(tool);
        }
    }
}
