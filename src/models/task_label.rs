use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TaskLabel {
    pub id: Uuid,
    /// `None` for the global default labels shared by every project.
    pub project_id: Option<Uuid>,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskLabel {
    pub fn is_global(&self) -> bool {
        self.project_id.is_none()
    }
}
