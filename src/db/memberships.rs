use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{InvitationStatus, Membership, ProjectRole, ProjectUser};

pub async fn find(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Option<Membership>, sqlx::Error> {
    sqlx::query_as::<_, Membership>(
        "SELECT * FROM project_members WHERE project_id = $1 AND user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Memberships of one user across several projects, keyed by project.
pub async fn find_for_projects(
    pool: &PgPool,
    user_id: Uuid,
    project_ids: &[Uuid],
) -> Result<Vec<Membership>, sqlx::Error> {
    sqlx::query_as::<_, Membership>(
        "SELECT * FROM project_members WHERE user_id = $1 AND project_id = ANY($2)",
    )
    .bind(user_id)
    .bind(project_ids)
    .fetch_all(pool)
    .await
}

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
    user_id: Uuid,
    role: ProjectRole,
    status: InvitationStatus,
    invited_by: Option<Uuid>,
) -> Result<Membership, sqlx::Error> {
    sqlx::query_as::<_, Membership>(
        "INSERT INTO project_members (project_id, user_id, role, status, invited_by)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(status.as_str())
    .bind(invited_by)
    .fetch_one(executor)
    .await
}

/// Invite (or re-invite after a decline). Accepted and pending rows are left
/// untouched; the returned row tells the caller which case applied.
pub async fn invite(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    role: ProjectRole,
    invited_by: Uuid,
) -> Result<Membership, sqlx::Error> {
    sqlx::query_as::<_, Membership>(
        "INSERT INTO project_members (project_id, user_id, role, status, invited_by)
         VALUES ($1, $2, $3, 'pending', $4)
         ON CONFLICT (project_id, user_id) DO UPDATE
            SET role = CASE WHEN project_members.status = 'declined'
                            THEN EXCLUDED.role ELSE project_members.role END,
                invited_by = CASE WHEN project_members.status = 'declined'
                                  THEN EXCLUDED.invited_by ELSE project_members.invited_by END,
                status = CASE WHEN project_members.status = 'declined'
                              THEN 'pending' ELSE project_members.status END,
                updated_at = now()
         RETURNING *",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(invited_by)
    .fetch_one(pool)
    .await
}

/// Move a pending invitation to `status`. Returns `None` when there was no
/// pending invitation for this user.
pub async fn respond(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
    status: InvitationStatus,
) -> Result<Option<Membership>, sqlx::Error> {
    sqlx::query_as::<_, Membership>(
        "UPDATE project_members SET status = $3, updated_at = now()
         WHERE project_id = $1 AND user_id = $2 AND status = 'pending'
         RETURNING *",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await
}

/// Users with an accepted membership, by name.
pub async fn accepted_users(pool: &PgPool, project_id: Uuid) -> Result<Vec<ProjectUser>, sqlx::Error> {
    sqlx::query_as::<_, ProjectUser>(
        "SELECT u.id, u.name, u.email, m.role FROM users u
         JOIN project_members m ON m.user_id = u.id
         WHERE m.project_id = $1 AND m.status = 'accepted'
         ORDER BY u.name ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn is_accepted_user(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (
            SELECT 1 FROM project_members
            WHERE project_id = $1 AND user_id = $2 AND status = 'accepted'
         )",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Pending invitations addressed to a user, with the project name.
pub async fn pending_for_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Vec<(Uuid, String, String)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT p.id, p.name, m.role FROM project_members m
         JOIN projects p ON p.id = m.project_id
         WHERE m.user_id = $1 AND m.status = 'pending'
         ORDER BY m.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
