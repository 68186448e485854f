use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Task, TaskLabel, TaskView};

const VIEW_SELECT: &str = "SELECT t.*, p.name AS project_name, s.name AS status_name,
        au.name AS assigned_user_name, cu.name AS created_by_name
     FROM tasks t
     JOIN projects p ON p.id = t.project_id
     JOIN task_statuses s ON s.id = t.status_id
     LEFT JOIN users au ON au.id = t.assigned_user_id
     JOIN users cu ON cu.id = t.created_by";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Name,
    CreatedAt,
    DueDate,
    Status,
}

impl SortColumn {
    pub fn parse(s: &str) -> Self {
        match s {
            "name" => SortColumn::Name,
            "due_date" => SortColumn::DueDate,
            "status" => SortColumn::Status,
            _ => SortColumn::CreatedAt,
        }
    }

    fn as_sql(&self, order: SortOrder) -> String {
        let dir = order.as_sql();
        match self {
            SortColumn::Name => format!("t.name {dir}"),
            SortColumn::CreatedAt => format!("t.created_at {dir}"),
            SortColumn::DueDate => format!("t.due_date {dir} NULLS LAST"),
            SortColumn::Status => format!("s.position {dir}, s.name {dir}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filters for the task listing. `viewer` is always applied: only tasks in
/// projects where the viewer holds an accepted membership are returned.
#[derive(Debug, Clone)]
pub struct TaskQuery {
    pub viewer: Uuid,
    pub assigned_to: Option<Uuid>,
    pub name_pattern: Option<String>,
    pub status_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub label_id: Option<Uuid>,
    pub sort_by: SortColumn,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, q: &TaskQuery) {
    qb.push(
        " WHERE t.project_id IN (
            SELECT project_id FROM project_members WHERE status = 'accepted' AND user_id = ",
    );
    qb.push_bind(q.viewer);
    qb.push(")");

    if let Some(assignee) = q.assigned_to {
        qb.push(" AND t.assigned_user_id = ").push_bind(assignee);
    }
    if let Some(pattern) = &q.name_pattern {
        qb.push(" AND t.name ILIKE ").push_bind(pattern.clone());
    }
    if let Some(status_id) = q.status_id {
        qb.push(" AND t.status_id = ").push_bind(status_id);
    }
    if let Some(project_id) = q.project_id {
        qb.push(" AND t.project_id = ").push_bind(project_id);
    }
    if let Some(label_id) = q.label_id {
        qb.push(" AND EXISTS (SELECT 1 FROM task_label_task tl WHERE tl.task_id = t.id AND tl.task_label_id = ")
            .push_bind(label_id)
            .push(")");
    }
}

pub async fn list(pool: &PgPool, q: &TaskQuery) -> Result<Vec<TaskView>, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(VIEW_SELECT);
    push_filters(&mut qb, q);
    qb.push(format!(" ORDER BY {}, t.id ASC", q.sort_by.as_sql(q.sort_order)));
    qb.push(" LIMIT ").push_bind(q.limit);
    qb.push(" OFFSET ").push_bind(q.offset);
    qb.build_query_as::<TaskView>().fetch_all(pool).await
}

pub async fn count(pool: &PgPool, q: &TaskQuery) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM tasks t JOIN task_statuses s ON s.id = t.status_id",
    );
    push_filters(&mut qb, q);
    let row: (i64,) = qb.build_query_as().fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_view(pool: &PgPool, id: Uuid) -> Result<Option<TaskView>, sqlx::Error> {
    sqlx::query_as::<_, TaskView>(&format!("{VIEW_SELECT} WHERE t.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[derive(sqlx::FromRow)]
struct LabelLink {
    task_id: Uuid,
    #[sqlx(flatten)]
    label: TaskLabel,
}

/// Labels attached to each of `task_ids`, ordered by label name.
pub async fn labels_for_tasks(
    pool: &PgPool,
    task_ids: &[Uuid],
) -> Result<Vec<(Uuid, TaskLabel)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LabelLink>(
        "SELECT tl.task_id, l.* FROM task_label_task tl
         JOIN task_labels l ON l.id = tl.task_label_id
         WHERE tl.task_id = ANY($1)
         ORDER BY l.name ASC",
    )
    .bind(task_ids)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| (r.task_id, r.label)).collect())
}

pub struct NewTask<'a> {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status_id: Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub due_date: Option<NaiveDate>,
    pub assigned_user_id: Option<Uuid>,
    pub image_path: Option<&'a str>,
    pub created_by: Uuid,
}

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    task: &NewTask<'_>,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (id, project_id, status_id, name, description, due_date,
                            assigned_user_id, image_path, created_by, updated_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) RETURNING *",
    )
    .bind(task.id)
    .bind(task.project_id)
    .bind(task.status_id)
    .bind(task.name)
    .bind(task.description)
    .bind(task.due_date)
    .bind(task.assigned_user_id)
    .bind(task.image_path)
    .bind(task.created_by)
    .fetch_one(executor)
    .await
}

/// Full replacement of the editable columns. The caller decides the assignee
/// and image (the current ones are passed back in when they do not change).
pub struct TaskChanges<'a> {
    pub status_id: Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub due_date: Option<NaiveDate>,
    pub assigned_user_id: Option<Uuid>,
    pub image_path: Option<&'a str>,
    pub updated_by: Uuid,
}

pub async fn update<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    changes: &TaskChanges<'_>,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "UPDATE tasks SET status_id = $2, name = $3, description = $4, due_date = $5,
                assigned_user_id = $6, image_path = $7, updated_by = $8, updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(changes.status_id)
    .bind(changes.name)
    .bind(changes.description)
    .bind(changes.due_date)
    .bind(changes.assigned_user_id)
    .bind(changes.image_path)
    .bind(changes.updated_by)
    .fetch_one(executor)
    .await
}

/// Replace the label set of a task.
pub async fn set_labels(
    tx: &mut sqlx::PgConnection,
    task_id: Uuid,
    label_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM task_label_task WHERE task_id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;
    if !label_ids.is_empty() {
        sqlx::query(
            "INSERT INTO task_label_task (task_id, task_label_id)
             SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(task_id)
        .bind(label_ids)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

/// Compare-and-set on the assignee: `None` when the row no longer holds
/// `expected`, or is gone.
pub async fn set_assignee(
    pool: &PgPool,
    id: Uuid,
    expected: Option<Uuid>,
    assigned_user_id: Option<Uuid>,
    updated_by: Uuid,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "UPDATE tasks SET assigned_user_id = $3, updated_by = $4, updated_at = now()
         WHERE id = $1 AND assigned_user_id IS NOT DISTINCT FROM $2 RETURNING *",
    )
    .bind(id)
    .bind(expected)
    .bind(assigned_user_id)
    .bind(updated_by)
    .fetch_optional(pool)
    .await
}

pub async fn set_image_path(
    pool: &PgPool,
    id: Uuid,
    image_path: Option<&str>,
    updated_by: Uuid,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "UPDATE tasks SET image_path = $2, updated_by = $3, updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(image_path)
    .bind(updated_by)
    .fetch_one(pool)
    .await
}

pub async fn image_paths_for_project(
    pool: &PgPool,
    project_id: Uuid,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT image_path FROM tasks WHERE project_id = $1 AND image_path IS NOT NULL",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
