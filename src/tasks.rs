/// file: src/tasks.rs
/// description: task list filtering, ordering and client-side checks before submission
use crate::error::ApiError;
use crate::types::{Identity, Task, User};
use std::cmp::Ordering;
use std::str::FromStr;

const INVALID_ASSIGNEE: &str = "Please select a valid user to assign the task.";

/// Server-side filters for `GET /tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub due_date: Option<String>,
}

impl TaskQuery {
    /// Only filters that are set and non-blank are sent.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        [
            ("search", &self.search),
            ("status", &self.status),
            ("priority", &self.priority),
            ("dueDate", &self.due_date),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v.to_string()))
        })
        .collect()
    }
}

/// Which tasks a list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    /// Tasks assigned to or created by the viewer.
    Mine,
}

impl Scope {
    /// Standard accounts never get the "all tasks" view.
    pub fn effective_for(self, viewer: &Identity) -> Scope {
        if viewer.role.is_elevated() {
            self
        } else {
            Scope::Mine
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Newest first.
    #[default]
    Created,
    /// Earliest due date first, undated last.
    Due,
    /// High before low.
    Priority,
    Status,
    Title,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "created" | "latest" => Ok(SortKey::Created),
            "due" | "due-date" => Ok(SortKey::Due),
            "priority" => Ok(SortKey::Priority),
            "status" => Ok(SortKey::Status),
            "title" => Ok(SortKey::Title),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

// None sorts after Some in every ordering below
fn some_first<T: Ord>(a: &Option<T>, b: &Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_tasks(tasks: &mut [Task], key: SortKey) {
    match key {
        SortKey::Created => {
            tasks.sort_by(|a, b| some_first(&a.created_at, &b.created_at, |x, y| y.cmp(x)))
        }
        SortKey::Due => tasks.sort_by(|a, b| some_first(&a.due_date, &b.due_date, Ord::cmp)),
        SortKey::Priority => {
            tasks.sort_by(|a, b| some_first(&a.priority, &b.priority, |x, y| y.cmp(x)))
        }
        SortKey::Status => tasks.sort_by(|a, b| some_first(&a.status, &b.status, Ord::cmp)),
        SortKey::Title => {
            tasks.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        }
    }
}

/// Applies the viewer scope locally, then orders the result.
pub fn arrange(mut tasks: Vec<Task>, viewer: &Identity, scope: Scope, key: SortKey) -> Vec<Task> {
    if scope.effective_for(viewer) == Scope::Mine {
        tasks.retain(|t| t.involves(&viewer.id));
    }
    sort_tasks(&mut tasks, key);
    tasks
}

/// Rejects an assignee id that is not in the user directory.
pub fn validate_assignee<'a>(users: &'a [User], assignee_id: &str) -> Result<&'a User, ApiError> {
    users
        .iter()
        .find(|u| u.id == assignee_id)
        .ok_or_else(|| ApiError::validation(INVALID_ASSIGNEE))
}

pub fn require_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::validation("Task title is required."));
    }
    Ok(())
}
