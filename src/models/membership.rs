use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Project-level role carried by a membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Administers every task and label in the project.
    Manager,
    /// Works on tasks assigned to them; may only self-assign.
    Member,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Manager => "manager",
            ProjectRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manager" => Some(ProjectRole::Manager),
            "member" => Some(ProjectRole::Member),
            _ => None,
        }
    }
}

impl TryFrom<String> for ProjectRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("Unknown project role: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Declined => "declined",
        }
    }
}

impl TryFrom<String> for InvitationStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "declined" => Ok(InvitationStatus::Declined),
            _ => Err(format!("Unknown invitation status: {value}")),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Membership {
    pub project_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: ProjectRole,
    #[sqlx(try_from = "String")]
    pub status: InvitationStatus,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// The role this membership grants, or `None` while the invitation is
    /// still pending or was declined.
    pub fn accepted_role(&self) -> Option<ProjectRole> {
        (self.status == InvitationStatus::Accepted).then_some(self.role)
    }
}

/// A user listed in the context of a project (assignee pickers, member lists).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProjectUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: ProjectRole,
}
