pub mod audit_event;
pub mod membership;
pub mod project;
pub mod refresh_token;
pub mod task;
pub mod task_comment;
pub mod task_label;
pub mod task_status;
pub mod user;

pub use audit_event::AuditEvent;
pub use membership::{InvitationStatus, Membership, ProjectRole, ProjectUser};
pub use project::{Project, ProjectStatus, ProjectWithRole};
pub use refresh_token::RefreshToken;
pub use task::{Task, TaskListItem, TaskPermissions, TaskView};
pub use task_comment::TaskComment;
pub use task_label::TaskLabel;
pub use task_status::{StatusOption, TaskStatus};
pub use user::User;
