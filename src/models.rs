use crate::error::{Result, TodoError};
use serde::Serialize;
use serde_json::Value;

pub const UNTITLED: &str = "(untitled)";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "En Progreso")]
    InProgress,
    #[serde(rename = "Completada")]
    Completed,
}

impl TaskStatus {
    /// Exact match against the backend's wire values.
    pub fn from_wire(value: &str) -> Option<TaskStatus> {
        match value {
            "Pendiente" => Some(TaskStatus::Pending),
            "En Progreso" => Some(TaskStatus::InProgress),
            "Completada" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Status the completion checkbox moves to. In-progress tasks drop back
    /// to pending rather than jumping to completed.
    pub fn toggled(&self) -> TaskStatus {
        match self {
            TaskStatus::Completed => TaskStatus::Pending,
            TaskStatus::Pending => TaskStatus::Completed,
            TaskStatus::InProgress => TaskStatus::Pending,
        }
    }

    pub fn is_completed(&self) -> bool {
        *self == TaskStatus::Completed
    }
}

// Task struct
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub owner_id: Option<String>,
    pub created_at: Option<String>,
    pub deleted: bool,
}

impl Task {
    /// Builds a task from whatever the server sent. Every field has a
    /// fallback except the identifier.
    pub fn from_value(value: &Value) -> Result<Task> {
        let id = non_null(value, "_id")
            .or_else(|| non_null(value, "id"))
            .and_then(scalar_text)
            .ok_or_else(|| {
                TodoError::InvalidResponse(format!("task without an identifier: {}", value))
            })?;

        let title = non_null(value, "title")
            .and_then(scalar_text)
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let status = value
            .get("status")
            .and_then(Value::as_str)
            .and_then(TaskStatus::from_wire)
            .unwrap_or_default();

        Ok(Task {
            id,
            title,
            description: non_null(value, "description")
                .and_then(scalar_text)
                .unwrap_or_default(),
            status,
            owner_id: non_null(value, "clienteId").and_then(scalar_text),
            created_at: non_null(value, "createdAt").and_then(scalar_text),
            deleted: value.get("deleted").map(is_truthy).unwrap_or(false),
        })
    }

    pub fn matches_search(&self, needle_lowercase: &str) -> bool {
        self.title.to_lowercase().contains(needle_lowercase)
            || self.description.to_lowercase().contains(needle_lowercase)
    }
}

/// Accepts `{items: [...]}` or a bare array. Records without an identifier
/// are returned separately so the caller can report them.
pub fn normalize_collection(payload: &Value) -> (Vec<Task>, Vec<TodoError>) {
    let raw = match payload.get("items").and_then(Value::as_array) {
        Some(items) => items.as_slice(),
        None => payload.as_array().map(Vec::as_slice).unwrap_or(&[]),
    };

    let mut tasks = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for item in raw {
        match Task::from_value(item) {
            Ok(task) => tasks.push(task),
            Err(err) => rejected.push(err),
        }
    }
    (tasks, rejected)
}

/// Accepts `{task: {...}}` or the bare record.
pub fn normalize_created(payload: &Value) -> Result<Task> {
    match non_null(payload, "task") {
        Some(inner) => Task::from_value(inner),
        None => Task::from_value(payload),
    }
}

fn non_null<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.get(key).filter(|v| !v.is_null())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    All,
    Active,
    Completed,
}

impl FilterMode {
    pub fn admits(&self, task: &Task) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Active => !task.status.is_completed(),
            FilterMode::Completed => task.status.is_completed(),
        }
    }

    pub fn next(&self) -> FilterMode {
        match self {
            FilterMode::All => FilterMode::Active,
            FilterMode::Active => FilterMode::Completed,
            FilterMode::Completed => FilterMode::All,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FilterMode::All => "All",
            FilterMode::Active => "Active",
            FilterMode::Completed => "Done",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub done: usize,
    pub pending: usize,
}

// Title and description being typed into a form
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
}

impl TaskDraft {
    pub fn clear(&mut self) {
        self.title.clear();
        self.description.clear();
    }
}
