use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task_label::TaskLabel;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub assigned_user_id: Option<Uuid>,
    pub image_path: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task joined with the display names of the rows it references.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TaskView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: Task,
    pub project_name: String,
    pub status_name: String,
    pub assigned_user_name: Option<String>,
    pub created_by_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskPermissions {
    pub can_manage: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_assign_to_me: bool,
    pub can_unassign: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListItem {
    #[serde(flatten)]
    pub view: TaskView,
    pub labels: Vec<TaskLabel>,
    pub permissions: TaskPermissions,
}
