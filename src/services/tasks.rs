//! Task queries and persistence.
//!
//! Authorization happens in the handlers before any of these run; the one
//! rule enforced here is the assignee normalisation for plain members, since
//! it changes what gets stored rather than whether the request proceeds.

use std::collections::HashMap;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::tasks::{NewTask, SortColumn, SortOrder, TaskChanges, TaskQuery};
use crate::error::AppError;
use crate::forms::{FormInput, UploadedFile};
use crate::models::{
    Membership, Project, StatusOption, Task, TaskComment, TaskLabel, TaskListItem, TaskView,
};
use crate::policy;
use crate::services;
use crate::state::AppState;
use crate::validation::{self, FieldErrors, MAX_IMAGE_KILOBYTES, MAX_NAME_LENGTH};

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 100;

/// Query string of the task listing. Empty values (`?status_id=`) count as
/// absent, as browsers submit every filter control.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskFilters {
    pub name: Option<String>,
    pub status_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub label_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl<S: Send + Sync> FromRequestParts<S> for TaskFilters {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        TaskFilters::from_query(parts.uri.query()).map_err(AppError::Validation)
    }
}

impl TaskFilters {
    /// Malformed ids and page numbers are reported per field. A repeated key
    /// keeps its last value.
    pub fn from_query(query: Option<&str>) -> Result<Self, FieldErrors> {
        let raw: HashMap<String, String> = form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
        let text = |key: &str| raw.get(key).map(String::as_str);

        let mut errors = FieldErrors::new();
        let filters = TaskFilters {
            name: validation::optional_string(text("name")),
            status_id: validation::optional_uuid(&mut errors, "status_id", text("status_id")),
            project_id: validation::optional_uuid(&mut errors, "project_id", text("project_id")),
            label_id: validation::optional_uuid(&mut errors, "label_id", text("label_id")),
            assigned_user_id: validation::optional_uuid(
                &mut errors,
                "assigned_user_id",
                text("assigned_user_id"),
            ),
            sort_field: validation::optional_string(text("sort_field")),
            sort_direction: validation::optional_string(text("sort_direction")),
            page: validation::optional_integer(&mut errors, "page", text("page")),
            per_page: validation::optional_integer(&mut errors, "per_page", text("per_page")),
        };
        errors.finish(filters)
    }

    fn to_query(&self, viewer: Uuid, mine: bool) -> (TaskQuery, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        let name_pattern = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(db::like_pattern);

        let query = TaskQuery {
            viewer,
            assigned_to: if mine { Some(viewer) } else { self.assigned_user_id },
            name_pattern,
            status_id: self.status_id,
            project_id: self.project_id,
            label_id: self.label_id,
            sort_by: SortColumn::parse(self.sort_field.as_deref().unwrap_or("created_at")),
            sort_order: SortOrder::parse(self.sort_direction.as_deref().unwrap_or("desc")),
            limit: per_page,
            offset: (page - 1) * per_page,
        };
        (query, page, per_page)
    }
}

#[derive(Debug, Serialize)]
pub struct TaskPage {
    pub data: Vec<TaskListItem>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

pub async fn get_tasks(pool: &PgPool, actor: Uuid, filters: &TaskFilters) -> Result<TaskPage, AppError> {
    list_page(pool, actor, filters, false).await
}

pub async fn get_my_tasks(pool: &PgPool, actor: Uuid, filters: &TaskFilters) -> Result<TaskPage, AppError> {
    list_page(pool, actor, filters, true).await
}

async fn list_page(
    pool: &PgPool,
    actor: Uuid,
    filters: &TaskFilters,
    mine: bool,
) -> Result<TaskPage, AppError> {
    let (query, page, per_page) = filters.to_query(actor, mine);
    let views = db::tasks::list(pool, &query).await?;
    let total = db::tasks::count(pool, &query).await?;
    let data = list_items(pool, actor, views).await?;

    Ok(TaskPage {
        data,
        total,
        page,
        per_page,
        total_pages: (total + per_page - 1) / per_page,
    })
}

/// Attach labels and per-task permissions, each computed against the
/// project that task belongs to.
pub async fn list_items(
    pool: &PgPool,
    actor: Uuid,
    views: Vec<TaskView>,
) -> Result<Vec<TaskListItem>, AppError> {
    let task_ids: Vec<Uuid> = views.iter().map(|v| v.task.id).collect();
    let mut project_ids: Vec<Uuid> = views.iter().map(|v| v.task.project_id).collect();
    project_ids.sort_unstable();
    project_ids.dedup();

    let mut labels: HashMap<Uuid, Vec<TaskLabel>> = HashMap::new();
    for (task_id, label) in db::tasks::labels_for_tasks(pool, &task_ids).await? {
        labels.entry(task_id).or_default().push(label);
    }

    let memberships: HashMap<Uuid, Membership> =
        db::memberships::find_for_projects(pool, actor, &project_ids)
            .await?
            .into_iter()
            .map(|m| (m.project_id, m))
            .collect();

    Ok(views
        .into_iter()
        .map(|view| {
            let membership = memberships.get(&view.task.project_id);
            let permissions = policy::task_permissions(actor, membership, &view.task);
            TaskListItem {
                labels: labels.remove(&view.task.id).unwrap_or_default(),
                permissions,
                view,
            }
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct OptionItem {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub label_options: Vec<OptionItem>,
    pub project_options: Vec<OptionItem>,
    pub status_options: Vec<StatusOption>,
}

/// Choices for the listing's filter controls, limited to what the actor can
/// see. Statuses with the same name across projects are listed once per
/// project since their ids differ.
pub async fn get_options(pool: &PgPool, actor: Uuid) -> Result<FilterOptions, AppError> {
    let projects = db::projects::list_accessible(pool, actor).await?;
    let project_ids: Vec<Uuid> = projects.iter().map(|p| p.project.id).collect();

    let labels = db::task_labels::list_for_projects(pool, &project_ids).await?;
    let statuses = db::task_statuses::list_for_projects(pool, &project_ids).await?;

    Ok(FilterOptions {
        label_options: labels
            .into_iter()
            .map(|l| OptionItem { id: l.id, name: l.name })
            .collect(),
        project_options: projects
            .into_iter()
            .map(|p| OptionItem {
                id: p.project.id,
                name: p.project.name,
            })
            .collect(),
        status_options: statuses.into_iter().map(StatusOption::from).collect(),
    })
}

/// The project's own statuses, or the default set when no project is given.
pub async fn get_status_options(
    pool: &PgPool,
    project: Option<&Project>,
) -> Result<Vec<StatusOption>, AppError> {
    match project {
        Some(project) => Ok(db::task_statuses::list_for_project(pool, project.id)
            .await?
            .into_iter()
            .map(StatusOption::from)
            .collect()),
        None => Ok(StatusOption::defaults()),
    }
}

/// Validated task form. `assigned_user_id` and `label_ids` are `None` when
/// the field was not submitted at all, so an update can leave them alone.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub project_id: Option<Uuid>,
    pub status_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub assigned_user_id: Option<Option<Uuid>>,
    pub label_ids: Option<Vec<Uuid>>,
}

impl TaskInput {
    /// Drop the assignee change; used when the actor may not reassign.
    pub fn without_assignee(mut self) -> Self {
        self.assigned_user_id = None;
        self
    }
}

pub fn validate_task(input: &FormInput, creating: bool) -> Result<TaskInput, FieldErrors> {
    let mut errors = FieldErrors::new();

    let project_id = if creating {
        validation::required_uuid(&mut errors, "project_id", input.text("project_id"))
    } else {
        None
    };
    let name = validation::required_string(&mut errors, "name", input.text("name"), MAX_NAME_LENGTH);
    let status_id = validation::required_uuid(&mut errors, "status_id", input.text("status_id"));
    let description = validation::optional_string(input.text("description"));
    let due_date = validation::optional_date(&mut errors, "due_date", input.text("due_date"));
    if let Some(file) = input.file("image") {
        validation::image(&mut errors, "image", file, MAX_IMAGE_KILOBYTES);
    }

    let assigned_user_id = input
        .contains("assigned_user_id")
        .then(|| validation::optional_uuid(&mut errors, "assigned_user_id", input.text("assigned_user_id")));
    let label_ids = input
        .contains("label_ids")
        .then(|| validation::uuid_list(&mut errors, "label_ids", input.list("label_ids")));

    errors.finish(TaskInput {
        project_id,
        status_id: status_id.unwrap_or_default(),
        name,
        description,
        due_date,
        assigned_user_id,
        label_ids,
    })
}

/// Checks that need the database: the status belongs to the project, the
/// assignee is an accepted member and every label is usable in the project.
async fn validate_references(
    pool: &PgPool,
    project_id: Uuid,
    input: &TaskInput,
) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    if db::task_statuses::find_in_project(pool, input.status_id, project_id)
        .await?
        .is_none()
    {
        errors.add("status_id", "The selected status is invalid for this project.");
    }

    if let Some(Some(assignee)) = input.assigned_user_id {
        if !db::memberships::is_accepted_user(pool, project_id, assignee).await? {
            errors.add("assigned_user_id", "The selected user is not a member of this project.");
        }
    }

    if let Some(label_ids) = &input.label_ids {
        if !label_ids.is_empty() {
            let available = db::task_labels::count_available(pool, project_id, label_ids).await?;
            if available != label_ids.len() as i64 {
                errors.add("label_ids", "One or more selected labels are invalid for this project.");
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Create a task. A plain member asking to assign someone else gets the
/// task assigned to themselves instead; the request still succeeds. An
/// uploaded image is stored before the row is written and removed again if
/// the write fails.
pub async fn store_task(
    state: &AppState,
    actor: Uuid,
    membership: Option<&Membership>,
    project: &Project,
    mut input: TaskInput,
    image: Option<&UploadedFile>,
) -> Result<Task, AppError> {
    if policy::is_project_member(membership) {
        if let Some(Some(assignee)) = input.assigned_user_id {
            if assignee != actor {
                tracing::debug!(
                    "Member {actor} asked to assign {assignee} in project {}; assigning to self",
                    project.id
                );
                input.assigned_user_id = Some(Some(actor));
            }
        }
    }

    validate_references(&state.pool, project.id, &input).await?;

    let task_id = Uuid::now_v7();
    let new_key = match image {
        Some(file) => Some(services::store_image(&*state.storage, "tasks", task_id, file).await?),
        None => None,
    };

    let result = insert_task(&state.pool, task_id, actor, project, &input, new_key.as_deref()).await;
    services::commit_image(&*state.storage, new_key.as_deref(), None, result).await
}

async fn insert_task(
    pool: &PgPool,
    task_id: Uuid,
    actor: Uuid,
    project: &Project,
    input: &TaskInput,
    image_path: Option<&str>,
) -> Result<Task, AppError> {
    let mut tx = pool.begin().await?;
    let task = db::tasks::create(
        &mut *tx,
        &NewTask {
            id: task_id,
            project_id: project.id,
            status_id: input.status_id,
            name: &input.name,
            description: input.description.as_deref(),
            due_date: input.due_date,
            assigned_user_id: input.assigned_user_id.flatten(),
            image_path,
            created_by: actor,
        },
    )
    .await?;
    if let Some(label_ids) = &input.label_ids {
        db::tasks::set_labels(&mut tx, task.id, label_ids).await?;
    }
    tx.commit().await?;
    Ok(task)
}

/// Update a task. Fields absent from `input` keep their stored values. A new
/// image replaces the old one only once the row points at it.
pub async fn update_task(
    state: &AppState,
    actor: Uuid,
    task: &Task,
    input: &TaskInput,
    image: Option<&UploadedFile>,
) -> Result<Task, AppError> {
    validate_references(&state.pool, task.project_id, input).await?;

    let new_key = match image {
        Some(file) => Some(services::store_image(&*state.storage, "tasks", task.id, file).await?),
        None => None,
    };
    let image_path = new_key.as_deref().or(task.image_path.as_deref());

    let result = write_task_changes(&state.pool, actor, task, input, image_path).await;
    services::commit_image(
        &*state.storage,
        new_key.as_deref(),
        task.image_path.as_deref(),
        result,
    )
    .await
}

async fn write_task_changes(
    pool: &PgPool,
    actor: Uuid,
    task: &Task,
    input: &TaskInput,
    image_path: Option<&str>,
) -> Result<Task, AppError> {
    let mut tx = pool.begin().await?;
    let updated = db::tasks::update(
        &mut *tx,
        task.id,
        &TaskChanges {
            status_id: input.status_id,
            name: &input.name,
            description: input.description.as_deref(),
            due_date: input.due_date,
            assigned_user_id: input.assigned_user_id.unwrap_or(task.assigned_user_id),
            image_path,
            updated_by: actor,
        },
    )
    .await?;
    if let Some(label_ids) = &input.label_ids {
        db::tasks::set_labels(&mut tx, task.id, label_ids).await?;
    }
    tx.commit().await?;
    Ok(updated)
}

pub async fn delete_task(state: &AppState, task: &Task) -> Result<(), AppError> {
    db::tasks::delete(&state.pool, task.id).await?;
    if let Some(key) = &task.image_path {
        if let Err(e) = state.storage.delete(key).await {
            tracing::warn!("Failed to delete image {key} of task {}: {e}", task.id);
        }
    }
    Ok(())
}

/// Claim the task for `actor`. The update only applies while the assignee is
/// still the one `task` was loaded with; a concurrent change yields a conflict.
pub async fn assign_to(pool: &PgPool, actor: Uuid, task: &Task) -> Result<Task, AppError> {
    change_assignee(pool, actor, task, Some(actor)).await
}

pub async fn unassign(pool: &PgPool, actor: Uuid, task: &Task) -> Result<Task, AppError> {
    change_assignee(pool, actor, task, None).await
}

async fn change_assignee(
    pool: &PgPool,
    actor: Uuid,
    task: &Task,
    assignee: Option<Uuid>,
) -> Result<Task, AppError> {
    db::tasks::set_assignee(pool, task.id, task.assigned_user_id, assignee, actor)
        .await?
        .ok_or_else(|| {
            tracing::debug!("Assignee of task {} changed while {actor} was updating it", task.id);
            AppError::Conflict("This task's assignee changed. Reload and try again.".to_string())
        })
}

/// Store a new image for the task, then drop the one it replaces.
pub async fn attach_image(
    state: &AppState,
    actor: Uuid,
    task: &Task,
    file: &UploadedFile,
) -> Result<Task, AppError> {
    let key = services::store_image(&*state.storage, "tasks", task.id, file).await?;
    let result = db::tasks::set_image_path(&state.pool, task.id, Some(&key), actor)
        .await
        .map_err(AppError::from);
    services::commit_image(&*state.storage, Some(&key), task.image_path.as_deref(), result).await
}

/// Remove the stored file, then clear the column. The two steps are not
/// atomic: a failed update leaves the row pointing at a missing file.
pub async fn delete_image(state: &AppState, actor: Uuid, task: &Task) -> Result<Task, AppError> {
    if let Some(key) = &task.image_path {
        state
            .storage
            .delete(key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete task image: {e}")))?;
    }
    Ok(db::tasks::set_image_path(&state.pool, task.id, None, actor).await?)
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    pub task: TaskListItem,
    pub comments: Vec<TaskComment>,
}

pub async fn task_detail(pool: &PgPool, actor: Uuid, task_id: Uuid) -> Result<TaskDetail, AppError> {
    let view = db::tasks::find_view(pool, task_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    let task = list_items(pool, actor, vec![view])
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    let comments = db::task_comments::list_for_task(pool, task_id).await?;
    Ok(TaskDetail { task, comments })
}

pub fn validate_comment(input: &FormInput) -> Result<String, FieldErrors> {
    let mut errors = FieldErrors::new();
    let body = validation::required_string(
        &mut errors,
        "body",
        input.text("body"),
        validation::MAX_COMMENT_LENGTH,
    );
    errors.finish(body)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filters_clamp_paging() {
        let filters = TaskFilters {
            page: Some(0),
            per_page: Some(1000),
            ..Default::default()
        };
        let (query, page, per_page) = filters.to_query(Uuid::nil(), false);
        assert_eq!(page, 1);
        assert_eq!(per_page, MAX_PER_PAGE);
        assert_eq!(query.offset, 0);
        assert_eq!(query.sort_by, SortColumn::CreatedAt);
        assert_eq!(query.sort_order, SortOrder::Desc);
    }

    #[test]
    fn filters_build_escaped_name_pattern() {
        let filters = TaskFilters {
            name: Some("  50%  ".to_string()),
            page: Some(3),
            sort_field: Some("name".to_string()),
            sort_direction: Some("ASC".to_string()),
            ..Default::default()
        };
        let me = Uuid::now_v7();
        let (query, _, per_page) = filters.to_query(me, true);
        assert_eq!(query.name_pattern.as_deref(), Some("%50\\%%"));
        assert_eq!(query.offset, 2 * per_page);
        assert_eq!(query.assigned_to, Some(me));
        assert_eq!(query.sort_by, SortColumn::Name);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn query_string_parses_blank_and_reports_malformed() {
        let project = Uuid::now_v7();
        let filters =
            TaskFilters::from_query(Some(&format!("name=a+b&status_id=&project_id={project}&page=2")))
                .unwrap();
        assert_eq!(filters.name.as_deref(), Some("a b"));
        assert_eq!(filters.status_id, None);
        assert_eq!(filters.project_id, Some(project));
        assert_eq!(filters.page, Some(2));

        let errors = TaskFilters::from_query(Some("status_id=abc&per_page=x")).unwrap_err();
        assert!(errors.has("status_id"));
        assert!(errors.has("per_page"));
        assert!(TaskFilters::from_query(None).is_ok());
    }

    #[test]
    fn create_requires_project_status_and_name() {
        let input = FormInput::from_json(&json!({ "description": "later" })).unwrap();
        let errors = validate_task(&input, true).unwrap_err();
        assert!(errors.has("project_id"));
        assert!(errors.has("status_id"));
        assert!(errors.has("name"));
    }

    #[test]
    fn update_ignores_project_and_tracks_absent_fields() {
        let input = FormInput::from_json(&json!({
            "name": "Rename",
            "status_id": Uuid::now_v7().to_string(),
        }))
        .unwrap();
        let parsed = validate_task(&input, false).unwrap();
        assert_eq!(parsed.project_id, None);
        assert_eq!(parsed.assigned_user_id, None);
        assert_eq!(parsed.label_ids, None);
    }

    #[test]
    fn null_assignee_means_clear() {
        let input = FormInput::from_json(&json!({
            "name": "Rename",
            "status_id": Uuid::now_v7().to_string(),
            "assigned_user_id": null,
            "label_ids": [],
        }))
        .unwrap();
        let parsed = validate_task(&input, false).unwrap();
        assert_eq!(parsed.assigned_user_id, Some(None));
        assert_eq!(parsed.label_ids, Some(vec![]));
        assert_eq!(parsed.without_assignee().assigned_user_id, None);
    }
}
