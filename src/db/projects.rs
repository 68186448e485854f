use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Project, ProjectStatus, ProjectWithRole};

pub struct NewProject<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub status: ProjectStatus,
    pub due_date: Option<NaiveDate>,
    pub image_path: Option<&'a str>,
    pub created_by: Uuid,
}

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    project: &NewProject<'_>,
) -> Result<Project, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "INSERT INTO projects (name, description, status, due_date, image_path, created_by, updated_by)
         VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING *",
    )
    .bind(project.name)
    .bind(project.description)
    .bind(project.status.as_str())
    .bind(project.due_date)
    .bind(project.image_path)
    .bind(project.created_by)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Projects where the user holds an accepted membership, by name.
pub async fn list_accessible(pool: &PgPool, user_id: Uuid) -> Result<Vec<ProjectWithRole>, sqlx::Error> {
    sqlx::query_as::<_, ProjectWithRole>(
        "SELECT p.*, m.role FROM projects p
         JOIN project_members m ON m.project_id = p.id
         WHERE m.user_id = $1 AND m.status = 'accepted'
         ORDER BY p.name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub struct ProjectChanges<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub status: ProjectStatus,
    pub due_date: Option<NaiveDate>,
    pub image_path: Option<&'a str>,
    pub updated_by: Uuid,
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    changes: &ProjectChanges<'_>,
) -> Result<Project, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "UPDATE projects SET name = $2, description = $3, status = $4, due_date = $5,
                image_path = $6, updated_by = $7, updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(changes.name)
    .bind(changes.description)
    .bind(changes.status.as_str())
    .bind(changes.due_date)
    .bind(changes.image_path)
    .bind(changes.updated_by)
    .fetch_one(pool)
    .await
}

pub async fn set_image_path(
    pool: &PgPool,
    id: Uuid,
    image_path: Option<&str>,
    updated_by: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE projects SET image_path = $2, updated_by = $3, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(image_path)
    .bind(updated_by)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
