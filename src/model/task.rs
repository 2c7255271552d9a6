use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: NaiveDate,
    pub assigned_to: u64,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Admins see everything; others only tasks they created or were given.
    pub fn visible_to(&self, user_id: u64, is_admin: bool) -> bool {
        is_admin || self.created_by == user_id || self.assigned_to == user_id
    }
}

/// The editable part of a task, shared by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    pub title: String,
    pub description: String,
    pub priority: TaskPriority,
    pub due_date: NaiveDate,
    pub assigned_to: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilter {
    All,
    CreatedBy(u64),
    AssignedTo(u64),
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match *self {
            TaskFilter::All => true,
            TaskFilter::CreatedBy(id) => task.created_by == id,
            TaskFilter::AssignedTo(id) => task.assigned_to == id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(TaskStatus::InProgress.as_ref(), "in_progress");
        assert_eq!(
            "cancelled".parse::<TaskStatus>().unwrap(),
            TaskStatus::Cancelled
        );
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"in_progress\"").unwrap(),
            TaskStatus::InProgress
        );
        assert!(serde_json::from_str::<TaskPriority>("\"urgent\"").is_err());
    }

    #[test]
    fn test_visibility() {
        let now = Utc::now();
        let task = Task {
            id: 1,
            title: "Refuel van".to_string(),
            description: "Before noon".to_string(),
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            due_date: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            assigned_to: 5,
            created_by: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(task.visible_to(5, false));
        assert!(task.visible_to(1, false));
        assert!(!task.visible_to(9, false));
        assert!(task.visible_to(9, true));
        assert!(TaskFilter::AssignedTo(5).matches(&task));
        assert!(!TaskFilter::CreatedBy(5).matches(&task));
    }
}
