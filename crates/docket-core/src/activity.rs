use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::{due_date_serde, workdays_until};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Done,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Done => "Done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" | "pendente" => Some(Status::Pending),
            "done" | "concluído" | "concluido" => Some(Status::Done),
            _ => None,
        }
    }
}

/// Board column a pending activity was dragged into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KanbanColumn {
    Todo,
    #[serde(rename = "inprogress")]
    InProgress,
}

impl KanbanColumn {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(KanbanColumn::Todo),
            "inprogress" | "in-progress" | "doing" => Some(KanbanColumn::InProgress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,

    pub source_sheet: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default)]
    pub note: String,

    #[serde(default)]
    pub total_time: String,

    pub status: Status,

    #[serde(default, with = "due_date_serde")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub workdays_until_due: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kanban_category: Option<KanbanColumn>,
}

impl Activity {
    pub fn has_note(&self) -> bool {
        !self.note.trim().is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn refresh_workdays(&mut self, today: NaiveDate) {
        self.workdays_until_due = self.due_date.map(|due| workdays_until(today, due));
    }

    /// Board column, defaulting to todo. `None` once the activity is done.
    pub fn kanban_column(&self) -> Option<KanbanColumn> {
        if self.is_pending() {
            Some(self.kanban_category.unwrap_or(KanbanColumn::Todo))
        } else {
            None
        }
    }
}
