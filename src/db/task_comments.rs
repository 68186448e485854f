use sqlx::PgPool;
use uuid::Uuid;

use crate::models::TaskComment;

pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<TaskComment>, sqlx::Error> {
    sqlx::query_as::<_, TaskComment>(
        "SELECT c.id, c.task_id, c.user_id, u.name AS user_name, c.body, c.created_at
         FROM task_comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.task_id = $1
         ORDER BY c.created_at ASC",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
}

pub async fn create(
    pool: &PgPool,
    task_id: Uuid,
    user_id: Uuid,
    body: &str,
) -> Result<TaskComment, sqlx::Error> {
    sqlx::query_as::<_, TaskComment>(
        "WITH inserted AS (
            INSERT INTO task_comments (task_id, user_id, body) VALUES ($1, $2, $3)
            RETURNING *
         )
         SELECT i.id, i.task_id, i.user_id, u.name AS user_name, i.body, i.created_at
         FROM inserted i JOIN users u ON u.id = i.user_id",
    )
    .bind(task_id)
    .bind(user_id)
    .bind(body)
    .fetch_one(pool)
    .await
}
