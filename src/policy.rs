//! Project and task capability rules.
//!
//! Every predicate takes the acting user and that user's membership row on
//! the relevant project explicitly. Only an accepted membership grants
//! anything; pending and declined invitations behave like no membership.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Membership, ProjectRole, Task, TaskPermissions};

fn accepted_role(membership: Option<&Membership>) -> Option<ProjectRole> {
    membership.and_then(Membership::accepted_role)
}

/// Any accepted membership, whatever the role.
pub fn can_view_project(membership: Option<&Membership>) -> bool {
    accepted_role(membership).is_some()
}

/// True only for a plain member; managers and outsiders are not "members".
pub fn is_project_member(membership: Option<&Membership>) -> bool {
    accepted_role(membership) == Some(ProjectRole::Member)
}

pub fn can_manage_task(membership: Option<&Membership>) -> bool {
    accepted_role(membership) == Some(ProjectRole::Manager)
}

pub fn can_create_task(membership: Option<&Membership>) -> bool {
    matches!(
        accepted_role(membership),
        Some(ProjectRole::Manager | ProjectRole::Member)
    )
}

pub fn can_edit_task(actor: Uuid, membership: Option<&Membership>, task: &Task) -> bool {
    can_manage_task(membership) || task.assigned_user_id == Some(actor)
}

/// Deliberately the same rule as [`can_edit_task`]: the assignee may delete.
pub fn can_delete_task(actor: Uuid, membership: Option<&Membership>, task: &Task) -> bool {
    can_edit_task(actor, membership, task)
}

/// "Assign to me". Managers may take any task not already theirs; members
/// may only pick up tasks nobody holds.
pub fn can_be_assigned_by(actor: Uuid, membership: Option<&Membership>, task: &Task) -> bool {
    if task.assigned_user_id == Some(actor) {
        return false;
    }
    match accepted_role(membership) {
        Some(ProjectRole::Manager) => true,
        Some(ProjectRole::Member) => task.assigned_user_id.is_none(),
        None => false,
    }
}

/// "Unassign". Managers may clear any assignee; members only themselves.
pub fn can_be_unassigned_by(actor: Uuid, membership: Option<&Membership>, task: &Task) -> bool {
    let Some(assignee) = task.assigned_user_id else {
        return false;
    };
    match accepted_role(membership) {
        Some(ProjectRole::Manager) => true,
        Some(ProjectRole::Member) => assignee == actor,
        None => false,
    }
}

/// Whether the actor may pick assignees other than themselves.
pub fn can_assign_others(membership: Option<&Membership>) -> bool {
    !is_project_member(membership)
}

pub fn task_permissions(actor: Uuid, membership: Option<&Membership>, task: &Task) -> TaskPermissions {
    TaskPermissions {
        can_manage: can_manage_task(membership),
        can_edit: can_edit_task(actor, membership, task),
        can_delete: can_delete_task(actor, membership, task),
        can_assign_to_me: can_be_assigned_by(actor, membership, task),
        can_unassign: can_be_unassigned_by(actor, membership, task),
    }
}

/// Turn a failed check into the 403 surfaced to the caller.
pub fn ensure(allowed: bool, message: &str) -> Result<(), AppError> {
    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::InvitationStatus;

    fn membership(user_id: Uuid, role: ProjectRole, status: InvitationStatus) -> Membership {
        Membership {
            project_id: Uuid::nil(),
            user_id,
            role,
            status,
            invited_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn task(assigned_user_id: Option<Uuid>) -> Task {
        let creator = Uuid::now_v7();
        Task {
            id: Uuid::now_v7(),
            project_id: Uuid::nil(),
            status_id: Uuid::now_v7(),
            name: "Write docs".to_string(),
            description: None,
            due_date: None,
            assigned_user_id,
            image_path: None,
            created_by: creator,
            updated_by: creator,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn only_accepted_plain_members_are_project_members() {
        let user = Uuid::now_v7();
        let member = membership(user, ProjectRole::Member, InvitationStatus::Accepted);
        let manager = membership(user, ProjectRole::Manager, InvitationStatus::Accepted);
        let pending = membership(user, ProjectRole::Member, InvitationStatus::Pending);
        let declined = membership(user, ProjectRole::Member, InvitationStatus::Declined);

        assert!(is_project_member(Some(&member)));
        assert!(!is_project_member(Some(&manager)));
        assert!(!is_project_member(Some(&pending)));
        assert!(!is_project_member(Some(&declined)));
        assert!(!is_project_member(None));
    }

    #[test]
    fn pending_manager_cannot_manage() {
        let user = Uuid::now_v7();
        let pending = membership(user, ProjectRole::Manager, InvitationStatus::Pending);
        assert!(!can_manage_task(Some(&pending)));
        assert!(!can_create_task(Some(&pending)));
        assert!(!can_view_project(Some(&pending)));
    }

    #[test]
    fn edit_requires_manager_or_assignee() {
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();
        let member = membership(user, ProjectRole::Member, InvitationStatus::Accepted);
        let manager = membership(user, ProjectRole::Manager, InvitationStatus::Accepted);

        assert!(can_edit_task(user, Some(&member), &task(Some(user))));
        assert!(!can_edit_task(user, Some(&member), &task(Some(other))));
        assert!(!can_edit_task(user, Some(&member), &task(None)));
        assert!(can_edit_task(user, Some(&manager), &task(Some(other))));
        assert!(can_edit_task(user, Some(&manager), &task(None)));
        // Assignee without any membership still passes the edit rule.
        assert!(can_edit_task(user, None, &task(Some(user))));
        assert!(!can_edit_task(user, None, &task(Some(other))));
    }

    #[test]
    fn delete_follows_edit() {
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();
        let member = membership(user, ProjectRole::Member, InvitationStatus::Accepted);
        for t in [task(Some(user)), task(Some(other)), task(None)] {
            assert_eq!(
                can_delete_task(user, Some(&member), &t),
                can_edit_task(user, Some(&member), &t)
            );
        }
    }

    #[test]
    fn member_can_only_pick_up_unassigned_tasks() {
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();
        let member = membership(user, ProjectRole::Member, InvitationStatus::Accepted);

        assert!(can_be_assigned_by(user, Some(&member), &task(None)));
        assert!(!can_be_assigned_by(user, Some(&member), &task(Some(other))));
        assert!(!can_be_assigned_by(user, Some(&member), &task(Some(user))));
        assert!(!can_be_assigned_by(user, None, &task(None)));
    }

    #[test]
    fn manager_can_take_over_any_task() {
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();
        let manager = membership(user, ProjectRole::Manager, InvitationStatus::Accepted);

        assert!(can_be_assigned_by(user, Some(&manager), &task(None)));
        assert!(can_be_assigned_by(user, Some(&manager), &task(Some(other))));
        assert!(!can_be_assigned_by(user, Some(&manager), &task(Some(user))));
    }

    #[test]
    fn unassign_boundaries() {
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();
        let member = membership(user, ProjectRole::Member, InvitationStatus::Accepted);
        let manager = membership(user, ProjectRole::Manager, InvitationStatus::Accepted);

        assert!(can_be_unassigned_by(user, Some(&member), &task(Some(user))));
        assert!(!can_be_unassigned_by(user, Some(&member), &task(Some(other))));
        assert!(!can_be_unassigned_by(user, Some(&member), &task(None)));
        assert!(can_be_unassigned_by(user, Some(&manager), &task(Some(other))));
        assert!(!can_be_unassigned_by(user, Some(&manager), &task(None)));
        assert!(!can_be_unassigned_by(user, None, &task(Some(user))));
    }

    #[test]
    fn ensure_maps_denial_to_forbidden() {
        assert!(ensure(true, "nope").is_ok());
        match ensure(false, "You cannot assign this task.") {
            Err(AppError::Forbidden(msg)) => assert_eq!(msg, "You cannot assign this task."),
            other => panic!("expected forbidden, got {other:?}"),
        }
    }
}
