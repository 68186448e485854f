use sqlx::PgPool;
use uuid::Uuid;

use crate::models::TaskLabel;

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<TaskLabel>, sqlx::Error> {
    sqlx::query_as::<_, TaskLabel>("SELECT * FROM task_labels WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Global labels plus the labels owned by `project_id`, optionally narrowed
/// by a case-insensitive name match, ordered by name.
pub async fn list_available(
    pool: &PgPool,
    project_id: Option<Uuid>,
    name_pattern: Option<&str>,
) -> Result<Vec<TaskLabel>, sqlx::Error> {
    sqlx::query_as::<_, TaskLabel>(
        "SELECT * FROM task_labels
         WHERE (project_id IS NULL OR project_id = $1)
           AND ($2::text IS NULL OR name ILIKE $2)
         ORDER BY name ASC",
    )
    .bind(project_id)
    .bind(name_pattern)
    .fetch_all(pool)
    .await
}

/// Labels usable by any of the given projects (globals included).
pub async fn list_for_projects(
    pool: &PgPool,
    project_ids: &[Uuid],
) -> Result<Vec<TaskLabel>, sqlx::Error> {
    sqlx::query_as::<_, TaskLabel>(
        "SELECT * FROM task_labels
         WHERE project_id IS NULL OR project_id = ANY($1)
         ORDER BY name ASC",
    )
    .bind(project_ids)
    .fetch_all(pool)
    .await
}

/// How many of `ids` may be attached to a task in `project_id`.
pub async fn count_available(
    pool: &PgPool,
    project_id: Uuid,
    ids: &[Uuid],
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM task_labels
         WHERE id = ANY($2) AND (project_id IS NULL OR project_id = $1)",
    )
    .bind(project_id)
    .bind(ids)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn create(pool: &PgPool, project_id: Uuid, name: &str) -> Result<TaskLabel, sqlx::Error> {
    sqlx::query_as::<_, TaskLabel>(
        "INSERT INTO task_labels (project_id, name) VALUES ($1, $2) RETURNING *",
    )
    .bind(project_id)
    .bind(name)
    .fetch_one(pool)
    .await
}

/// Only project-scoped rows match; global labels are never updated here.
pub async fn update(pool: &PgPool, id: Uuid, name: &str) -> Result<TaskLabel, sqlx::Error> {
    sqlx::query_as::<_, TaskLabel>(
        "UPDATE task_labels SET name = $2, updated_at = now()
         WHERE id = $1 AND project_id IS NOT NULL RETURNING *",
    )
    .bind(id)
    .bind(name)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM task_labels WHERE id = $1 AND project_id IS NOT NULL")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
