use sqlx::PgPool;
use uuid::Uuid;

use crate::models::task_status::DEFAULT_STATUSES;
use crate::models::TaskStatus;

/// Give a freshly created project its own copy of the default statuses.
pub async fn seed_defaults<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    project_id: Uuid,
) -> Result<Vec<TaskStatus>, sqlx::Error> {
    let names: Vec<String> = DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect();
    let positions: Vec<i32> = (0..names.len() as i32).collect();
    sqlx::query_as::<_, TaskStatus>(
        "INSERT INTO task_statuses (project_id, name, position)
         SELECT $1, name, position FROM UNNEST($2::text[], $3::int[]) AS s(name, position)
         RETURNING *",
    )
    .bind(project_id)
    .bind(&names)
    .bind(&positions)
    .fetch_all(executor)
    .await
}

pub async fn list_for_project(pool: &PgPool, project_id: Uuid) -> Result<Vec<TaskStatus>, sqlx::Error> {
    sqlx::query_as::<_, TaskStatus>(
        "SELECT * FROM task_statuses WHERE project_id = $1 ORDER BY position ASC, name ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn list_for_projects(
    pool: &PgPool,
    project_ids: &[Uuid],
) -> Result<Vec<TaskStatus>, sqlx::Error> {
    sqlx::query_as::<_, TaskStatus>(
        "SELECT * FROM task_statuses WHERE project_id = ANY($1)
         ORDER BY position ASC, name ASC",
    )
    .bind(project_ids)
    .fetch_all(pool)
    .await
}

pub async fn find_in_project(
    pool: &PgPool,
    id: Uuid,
    project_id: Uuid,
) -> Result<Option<TaskStatus>, sqlx::Error> {
    sqlx::query_as::<_, TaskStatus>(
        "SELECT * FROM task_statuses WHERE id = $1 AND project_id = $2",
    )
    .bind(id)
    .bind(project_id)
    .fetch_optional(pool)
    .await
}
