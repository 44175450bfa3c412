use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{comment, section, subtask, task_item};

/// Soft-delete state of a section or task item.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrashState {
    Active,
    Trashed { at: DateTime<Utc>, by: Option<String> },
}

impl TrashState {
    pub fn from_columns(deleted_at: Option<DateTime<Utc>>, deleted_by: Option<&str>) -> Self {
        match deleted_at {
            Some(at) => Self::Trashed {
                at,
                by: deleted_by.map(str::to_string),
            },
            None => Self::Active,
        }
    }

    pub fn is_trashed(&self) -> bool {
        matches!(self, Self::Trashed { .. })
    }

    /// The trashed state for `by` at `at`.
    pub fn trash(by: &str, at: DateTime<Utc>) -> Self {
        Self::Trashed {
            at,
            by: Some(by.to_string()),
        }
    }

    /// Column values for `deleted_at` and `deleted_by`.
    pub fn into_columns(self) -> (Option<DateTime<Utc>>, Option<String>) {
        match self {
            Self::Active => (None, None),
            Self::Trashed { at, by } => (Some(at), by),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub id: i64,
    pub order: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskItemInput {
    pub title: String,
    pub description: Option<String>,
    pub date: Option<String>,
    pub subtasks: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskItemChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub subtasks: Option<String>,
    pub progress: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubtaskChanges {
    pub title: Option<String>,
    pub is_completed: Option<bool>,
}

/// Result of applying a reorder batch against one scope.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ReorderOutcome {
    pub applied: Vec<i64>,
    pub ignored: Vec<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskItemView {
    #[serde(flatten)]
    pub item: task_item::Model,
    pub subtasks_list: Vec<subtask::Model>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SectionView {
    #[serde(flatten)]
    pub section: section::Model,
    pub item_count: usize,
    pub items: Vec<TaskItemView>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TaskItemDetail {
    #[serde(flatten)]
    pub item: task_item::Model,
    pub subtasks_list: Vec<subtask::Model>,
    pub comments: Vec<comment::Model>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrashedSection {
    #[serde(flatten)]
    pub section: section::Model,
    pub trashed_item_count: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrashedTaskItem {
    #[serde(flatten)]
    pub item: task_item::Model,
    pub subtask_count: u64,
    pub section_title: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct TrashListing {
    pub sections: Vec<TrashedSection>,
    pub items: Vec<TrashedTaskItem>,
}

/// A section after a delete or restore cascade, with the number of task
/// items the cascade moved along with it.
#[derive(Clone, Debug, Serialize)]
pub struct SectionCascade {
    pub section: section::Model,
    pub items_affected: u64,
}
