use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::forms::{FormInput, UploadedFile};
use crate::middleware::audit;
use crate::models::{
    AuditEvent, InvitationStatus, Project, ProjectRole, ProjectUser, ProjectWithRole,
    StatusOption, TaskLabel,
};
use crate::policy;
use crate::routes::{flash, Flash};
use crate::services::labels::{self as label_service, LabelFilters};
use crate::services::projects::{self as project_service, ProjectAccess};
use crate::services::tasks as task_service;
use crate::state::SharedState;
use crate::validation::{self, FieldErrors, MAX_IMAGE_KILOBYTES};

/// Load the project and require an accepted membership on it.
pub(crate) async fn viewable(
    state: &SharedState,
    auth: &AuthUser,
    project_id: Uuid,
    message: &str,
) -> Result<ProjectAccess, AppError> {
    let access = project_service::load_access(&state.pool, project_id, auth.user_id).await?;
    policy::ensure(policy::can_view_project(access.membership()), message)?;
    Ok(access)
}

async fn managed(
    state: &SharedState,
    auth: &AuthUser,
    project_id: Uuid,
    message: &str,
) -> Result<ProjectAccess, AppError> {
    let access = project_service::load_access(&state.pool, project_id, auth.user_id).await?;
    policy::ensure(policy::can_manage_task(access.membership()), message)?;
    Ok(access)
}

/// The `image` upload of a dedicated image endpoint, validated.
pub(crate) fn required_image(input: &FormInput) -> Result<&UploadedFile, AppError> {
    let mut errors = FieldErrors::new();
    let Some(file) = input.file("image") else {
        errors.add("image", "The image field is required.");
        return Err(errors.into());
    };
    validation::image(&mut errors, "image", file, MAX_IMAGE_KILOBYTES);
    errors.finish(file).map_err(AppError::from)
}

pub async fn list(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<ProjectWithRole>>, AppError> {
    let projects = db::projects::list_accessible(&state.pool, auth.user_id).await?;
    Ok(Json(projects))
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let fields = project_service::validate_project(&input, MAX_IMAGE_KILOBYTES)?;
    let project =
        project_service::create_project(&state, auth.user_id, &fields, input.file("image")).await?;

    audit::log_event(
        &state.pool,
        Some(project.id),
        auth.user_id,
        "project.created",
        "project",
        Some(project.id),
        Some(json!({ "name": project.name })),
    )
    .await;

    Ok(flash(
        "Project created successfully.",
        format!("/projects/{}", project.id),
    ))
}

#[derive(Serialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub role: Option<ProjectRole>,
    pub can_manage_tasks: bool,
    pub can_create_tasks: bool,
}

pub async fn get(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectDetail>, AppError> {
    let access = viewable(&state, &auth, id, "You cannot view this project.").await?;
    let membership = access.membership();
    Ok(Json(ProjectDetail {
        role: membership.and_then(|m| m.accepted_role()),
        can_manage_tasks: policy::can_manage_task(membership),
        can_create_tasks: policy::can_create_task(membership),
        project: access.project,
    }))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let access = managed(&state, &auth, id, "You cannot update this project.").await?;
    let fields = project_service::validate_project(&input, MAX_IMAGE_KILOBYTES)?;

    let project = project_service::update_project(
        &state,
        auth.user_id,
        &access.project,
        &fields,
        input.file("image"),
    )
    .await?;

    audit::log_event(
        &state.pool,
        Some(project.id),
        auth.user_id,
        "project.updated",
        "project",
        Some(project.id),
        None,
    )
    .await;

    Ok(flash(
        format!("Project '{}' updated successfully.", project.name),
        format!("/projects/{}", project.id),
    ))
}

pub async fn upload_image(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let access = managed(&state, &auth, id, "You cannot update this project.").await?;

    let file = required_image(&input)?;
    project_service::replace_image(&state, auth.user_id, &access.project, file).await?;

    Ok(flash(
        "Project image updated successfully.",
        format!("/projects/{}", access.project.id),
    ))
}

pub async fn delete(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    let access = managed(&state, &auth, id, "You cannot delete this project.").await?;
    project_service::delete_project(&state, &access.project).await?;

    audit::log_event(
        &state.pool,
        None,
        auth.user_id,
        "project.deleted",
        "project",
        Some(access.project.id),
        Some(json!({ "name": access.project.name })),
    )
    .await;

    Ok(flash(
        format!("Project '{}' deleted successfully.", access.project.name),
        "/projects",
    ))
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub page: Option<i64>,
}

pub async fn activity(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let access = managed(&state, &auth, id, "You cannot view this project's activity.").await?;
    let per_page = 50;
    let offset = (query.page.unwrap_or(1).max(1) - 1) * per_page;
    let events = db::audit::list_for_project(&state.pool, access.project.id, per_page, offset).await?;
    Ok(Json(events))
}

#[derive(Serialize)]
pub struct StatusOptions {
    pub status_options: Vec<StatusOption>,
}

pub async fn statuses(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusOptions>, AppError> {
    let access = viewable(&state, &auth, id, "You cannot view this project.").await?;
    let status_options = task_service::get_status_options(&state.pool, Some(&access.project)).await?;
    Ok(Json(StatusOptions { status_options }))
}

#[derive(Serialize)]
pub struct LabelCollection {
    pub data: Vec<TaskLabel>,
}

pub async fn task_labels(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(filters): Query<LabelFilters>,
) -> Result<Json<LabelCollection>, AppError> {
    let access = viewable(&state, &auth, id, "You cannot view this project.").await?;
    let data = label_service::get_project_labels(&state.pool, &access.project, &filters).await?;
    Ok(Json(LabelCollection { data }))
}

#[derive(Serialize)]
pub struct ProjectUsers {
    pub users: Vec<ProjectUser>,
}

pub async fn users(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectUsers>, AppError> {
    let access = viewable(&state, &auth, id, "You are not authorized to view project users.").await?;
    let users = project_service::project_users(&state.pool, auth.user_id, &access).await?;
    Ok(Json(ProjectUsers { users }))
}

pub async fn invite(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let access = managed(&state, &auth, id, "You cannot invite users to this project.").await?;
    let fields = project_service::validate_invite(&input)?;
    let membership =
        project_service::invite(&state.pool, auth.user_id, &access.project, &fields).await?;

    audit::log_event(
        &state.pool,
        Some(access.project.id),
        auth.user_id,
        "member.invited",
        "user",
        Some(membership.user_id),
        Some(json!({ "role": membership.role.as_str() })),
    )
    .await;

    Ok(flash(
        format!("Invitation sent to {}.", fields.email),
        format!("/projects/{}", access.project.id),
    ))
}

async fn respond(
    auth: AuthUser,
    state: SharedState,
    project_id: Uuid,
    status: InvitationStatus,
) -> Result<Json<Flash>, AppError> {
    let project = db::projects::find_by_id(&state.pool, project_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    db::memberships::respond(&state.pool, project.id, auth.user_id, status)
        .await?
        .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;

    let (action, message, redirect) = match status {
        InvitationStatus::Accepted => (
            "member.accepted",
            format!("You joined '{}'.", project.name),
            format!("/projects/{}", project.id),
        ),
        _ => (
            "member.declined",
            format!("You declined the invitation to '{}'.", project.name),
            "/dashboard".to_string(),
        ),
    };

    audit::log_event(
        &state.pool,
        Some(project.id),
        auth.user_id,
        action,
        "user",
        Some(auth.user_id),
        None,
    )
    .await;

    Ok(flash(message, redirect))
}

pub async fn accept_invitation(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    respond(auth, state, id, InvitationStatus::Accepted).await
}

pub async fn decline_invitation(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Flash>, AppError> {
    respond(auth, state, id, InvitationStatus::Declined).await
}

#[derive(Serialize)]
pub struct PendingInvitation {
    pub project_id: Uuid,
    pub project_name: String,
    pub role: String,
}

pub async fn pending_invitations(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Vec<PendingInvitation>>, AppError> {
    let pending = db::memberships::pending_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(
        pending
            .into_iter()
            .map(|(project_id, project_name, role)| PendingInvitation {
                project_id,
                project_name,
                role,
            })
            .collect(),
    ))
}
