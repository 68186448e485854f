use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Statuses seeded into every new project, in board order.
pub const DEFAULT_STATUSES: [&str; 3] = ["To Do", "In Progress", "Completed"];

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A status choice offered to forms and filters. The default set has no ids
/// until a project exists to own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOption {
    pub id: Option<Uuid>,
    pub name: String,
}

impl StatusOption {
    pub fn defaults() -> Vec<StatusOption> {
        DEFAULT_STATUSES
            .iter()
            .map(|name| StatusOption {
                id: None,
                name: name.to_string(),
            })
            .collect()
    }
}

impl From<TaskStatus> for StatusOption {
    fn from(status: TaskStatus) -> Self {
        StatusOption {
            id: Some(status.id),
            name: status.name,
        }
    }
}
