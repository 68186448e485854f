use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::forms::FormInput;
use crate::middleware::audit;
use crate::models::{Membership, ProjectUser, ProjectWithRole, StatusOption, Task, TaskLabel, TaskListItem};
use crate::policy;
use crate::routes::projects::required_image;
use crate::routes::{flash, Flash};
use crate::services::projects::{self as project_service, ProjectAccess};
use crate::services::tasks::{self as task_service, FilterOptions, TaskDetail, TaskFilters, TaskPage};
use crate::state::SharedState;

const TASKS_URL: &str = "/tasks";

fn task_url(task: &Task) -> String {
    format!("/tasks/{}", task.id)
}

fn not_found() -> AppError {
    AppError::NotFound("Task not found".to_string())
}

/// The task plus the actor's membership on its project.
async fn load_task(state: &SharedState, auth: &AuthUser, id: Uuid) -> Result<(Task, Option<Membership>), AppError> {
    let task = db::tasks::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;
    let membership = db::memberships::find(&state.pool, task.project_id, auth.user_id).await?;
    Ok((task, membership))
}

#[derive(Serialize)]
pub struct ListPermissions {
    /// Only known when the listing is narrowed to one project.
    pub can_manage_tasks: Option<bool>,
}

#[derive(Serialize)]
pub struct TaskIndex {
    pub tasks: TaskPage,
    pub query_params: TaskFilters,
    #[serde(flatten)]
    pub options: FilterOptions,
    pub permissions: ListPermissions,
}

async fn index_response(
    state: &SharedState,
    auth: &AuthUser,
    filters: TaskFilters,
    tasks: TaskPage,
) -> Result<Json<TaskIndex>, AppError> {
    let options = task_service::get_options(&state.pool, auth.user_id).await?;
    let can_manage_tasks = match filters.project_id {
        Some(project_id) => {
            let membership = db::memberships::find(&state.pool, project_id, auth.user_id).await?;
            Some(policy::can_manage_task(membership.as_ref()))
        }
        None => None,
    };

    Ok(Json(TaskIndex {
        tasks,
        query_params: filters,
        options,
        permissions: ListPermissions { can_manage_tasks },
    }))
}

pub async fn index(
    auth: AuthUser,
    State(state): State<SharedState>,
    filters: TaskFilters,
) -> Result<Json<TaskIndex>, AppError> {
    let tasks = task_service::get_tasks(&state.pool, auth.user_id, &filters).await?;
    index_response(&state, &auth, filters, tasks).await
}

pub async fn mine(
    auth: AuthUser,
    State(state): State<SharedState>,
    filters: TaskFilters,
) -> Result<Json<TaskIndex>, AppError> {
    let tasks = task_service::get_my_tasks(&state.pool, auth.user_id, &filters).await?;
    index_response(&state, &auth, filters, tasks).await
}

#[derive(Deserialize)]
pub struct CreateQuery {
    pub project_id: Option<String>,
    pub status_id: Option<String>,
}

#[derive(Serialize)]
pub struct TaskCreateForm {
    pub projects: Vec<ProjectWithRole>,
    pub users: Vec<ProjectUser>,
    pub labels: Vec<TaskLabel>,
    pub can_assign_others: bool,
    pub current_user_id: Uuid,
    pub status_options: Vec<StatusOption>,
    pub selected_project_id: Option<Uuid>,
    pub selected_status_id: Option<Uuid>,
    pub from_project_page: bool,
}

fn parse_id(raw: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Uuid::parse_str(s)
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid id: {s}"))),
    }
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    Query(query): Query<CreateQuery>,
) -> Result<Json<TaskCreateForm>, AppError> {
    let selected_status_id = parse_id(query.status_id.as_deref())?;
    let selected = match parse_id(query.project_id.as_deref())? {
        Some(project_id) => {
            let access = project_service::load_access(&state.pool, project_id, auth.user_id).await?;
            policy::ensure(
                policy::can_create_task(access.membership()),
                "You cannot create tasks for this project.",
            )?;
            Some(access)
        }
        None => None,
    };

    let projects = db::projects::list_accessible(&state.pool, auth.user_id).await?;
    let users = match &selected {
        Some(access) => project_service::project_users(&state.pool, auth.user_id, access).await?,
        None => Vec::new(),
    };
    let project = selected.as_ref().map(|a| &a.project);
    let labels = db::task_labels::list_available(&state.pool, project.map(|p| p.id), None).await?;
    let status_options = task_service::get_status_options(&state.pool, project).await?;

    Ok(Json(TaskCreateForm {
        projects,
        users,
        labels,
        can_assign_others: selected
            .as_ref()
            .is_none_or(|a| policy::can_assign_others(a.membership())),
        current_user_id: auth.user_id,
        status_options,
        selected_project_id: project.map(|p| p.id),
        selected_status_id,
        from_project_page: project.is_some(),
    }))
}

pub async fn store(
    auth: AuthUser,
    State(state): State<SharedState>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let fields = task_service::validate_task(&input, true)?;
    let project_id = fields.project_id.ok_or_else(|| {
        AppError::BadRequest("The project id field is required.".to_string())
    })?;
    let ProjectAccess { project, membership } =
        project_service::load_access(&state.pool, project_id, auth.user_id).await?;
    policy::ensure(
        policy::can_create_task(membership.as_ref()),
        "You cannot create tasks for this project.",
    )?;

    let task = task_service::store_task(
        &state,
        auth.user_id,
        membership.as_ref(),
        &project,
        fields,
        input.file("image"),
    )
    .await?;

    audit::log_event(
        &state.pool,
        Some(project.id),
        auth.user_id,
        "task.created",
        "task",
        Some(task.id),
        Some(json!({ "name": task.name })),
    )
    .await;

    Ok(flash("Task created successfully.", TASKS_URL))
}

pub async fn show(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDetail>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_view_project(membership.as_ref()),
        "You are not authorized to view this task.",
    )?;
    let detail = task_service::task_detail(&state.pool, auth.user_id, task.id).await?;
    Ok(Json(detail))
}

#[derive(Serialize)]
pub struct TaskEditForm {
    pub task: TaskListItem,
    pub users: Vec<ProjectUser>,
    pub labels: Vec<TaskLabel>,
    pub can_change_assignee: bool,
    pub status_options: Vec<StatusOption>,
}

pub async fn edit(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskEditForm>, AppError> {
    let task = db::tasks::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(not_found)?;
    let access = project_service::load_access(&state.pool, task.project_id, auth.user_id).await?;
    policy::ensure(
        policy::can_edit_task(auth.user_id, access.membership(), &task),
        "You are not authorized to edit this task.",
    )?;

    let view = db::tasks::find_view(&state.pool, task.id)
        .await?
        .ok_or_else(not_found)?;
    let item = task_service::list_items(&state.pool, auth.user_id, vec![view])
        .await?
        .pop()
        .ok_or_else(not_found)?;
    let users = project_service::project_users(&state.pool, auth.user_id, &access).await?;
    let labels =
        db::task_labels::list_available(&state.pool, Some(access.project.id), None).await?;
    let status_options =
        task_service::get_status_options(&state.pool, Some(&access.project)).await?;

    Ok(Json(TaskEditForm {
        task: item,
        users,
        labels,
        can_change_assignee: policy::can_assign_others(access.membership()),
        status_options,
    }))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_edit_task(auth.user_id, membership.as_ref(), &task),
        "You are not authorized to edit this task.",
    )?;

    let mut fields = task_service::validate_task(&input, false)?;
    if !policy::can_manage_task(membership.as_ref()) {
        fields = fields.without_assignee();
    }

    let updated =
        task_service::update_task(&state, auth.user_id, &task, &fields, input.file("image")).await?;

    audit::log_event(
        &state.pool,
        Some(task.project_id),
        auth.user_id,
        "task.updated",
        "task",
        Some(task.id),
        None,
    )
    .await;

    Ok(flash(
        format!("Task '{}' updated successfully.", updated.name),
        TASKS_URL,
    ))
}

pub async fn destroy(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_delete_task(auth.user_id, membership.as_ref(), &task),
        "You are not authorized to delete this task.",
    )?;

    task_service::delete_task(&state, &task).await?;

    audit::log_event(
        &state.pool,
        Some(task.project_id),
        auth.user_id,
        "task.deleted",
        "task",
        Some(task.id),
        Some(json!({ "name": task.name })),
    )
    .await;

    Ok(flash(
        format!("Task '{}' deleted successfully.", task.name),
        TASKS_URL,
    ))
}

pub async fn assign_to_me(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_be_assigned_by(auth.user_id, membership.as_ref(), &task),
        "You cannot assign this task.",
    )?;

    task_service::assign_to(&state.pool, auth.user_id, &task).await?;

    audit::log_event(
        &state.pool,
        Some(task.project_id),
        auth.user_id,
        "task.assigned",
        "task",
        Some(task.id),
        Some(json!({ "previous_assignee": task.assigned_user_id })),
    )
    .await;

    Ok(flash("Task assigned successfully.", task_url(&task)))
}

pub async fn unassign(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_be_unassigned_by(auth.user_id, membership.as_ref(), &task),
        "You cannot unassign this task.",
    )?;

    task_service::unassign(&state.pool, auth.user_id, &task).await?;

    audit::log_event(
        &state.pool,
        Some(task.project_id),
        auth.user_id,
        "task.unassigned",
        "task",
        Some(task.id),
        Some(json!({ "previous_assignee": task.assigned_user_id })),
    )
    .await;

    Ok(flash("Task unassigned successfully.", task_url(&task)))
}

pub async fn upload_image(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_edit_task(auth.user_id, membership.as_ref(), &task),
        "You are not authorized to update this task's image.",
    )?;

    let file = required_image(&input)?;
    task_service::attach_image(&state, auth.user_id, &task, file).await?;

    Ok(flash("Task image updated successfully.", task_url(&task)))
}

pub async fn delete_image(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_edit_task(auth.user_id, membership.as_ref(), &task),
        "You are not authorized to delete this task's image.",
    )?;

    task_service::delete_image(&state, auth.user_id, &task).await?;

    Ok(flash("Task image deleted successfully.", task_url(&task)))
}

pub async fn add_comment(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let (task, membership) = load_task(&state, &auth, id).await?;
    policy::ensure(
        policy::can_view_project(membership.as_ref()),
        "You are not authorized to comment on this task.",
    )?;

    let body = task_service::validate_comment(&input)?;
    let comment = db::task_comments::create(&state.pool, task.id, auth.user_id, &body).await?;

    audit::log_event(
        &state.pool,
        Some(task.project_id),
        auth.user_id,
        "comment.created",
        "task_comment",
        Some(comment.id),
        None,
    )
    .await;

    Ok(flash("Comment added successfully.", task_url(&task)))
}
