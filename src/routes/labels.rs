use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::error::AppError;
use crate::forms::FormInput;
use crate::middleware::audit;
use crate::models::{Project, TaskLabel};
use crate::policy;
use crate::routes::projects::viewable;
use crate::routes::{flash, Flash};
use crate::services::labels::{self as label_service, LabelFilters};
use crate::services::projects::{self as project_service, ProjectAccess};
use crate::state::SharedState;

#[derive(Serialize)]
pub struct ProjectRef {
    pub id: Uuid,
    pub name: String,
}

impl From<&Project> for ProjectRef {
    fn from(project: &Project) -> Self {
        ProjectRef {
            id: project.id,
            name: project.name.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct LabelIndex {
    pub project: ProjectRef,
    pub labels: Vec<TaskLabel>,
    pub can_manage_labels: bool,
    pub query_params: LabelFilters,
}

#[derive(Serialize)]
pub struct LabelForm {
    pub project: ProjectRef,
    pub label: Option<TaskLabel>,
}

fn labels_url(project: &Project) -> String {
    format!("/projects/{}/labels", project.id)
}

async fn managed(state: &SharedState, auth: &AuthUser, project_id: Uuid) -> Result<ProjectAccess, AppError> {
    let access = project_service::load_access(&state.pool, project_id, auth.user_id).await?;
    policy::ensure(
        policy::can_manage_task(access.membership()),
        "You are not authorized to manage labels for this project.",
    )?;
    Ok(access)
}

/// Resolve the label, refuse global ones with `message`, then require the
/// manager role. Global labels are refused for every caller.
async fn editable_label(
    state: &SharedState,
    auth: &AuthUser,
    project_id: Uuid,
    label_id: Uuid,
    message: &str,
) -> Result<(ProjectAccess, TaskLabel), AppError> {
    let access = project_service::load_access(&state.pool, project_id, auth.user_id).await?;
    let label = label_service::find_project_label(&state.pool, &access.project, label_id).await?;
    policy::ensure(!label.is_global(), message)?;
    policy::ensure(
        policy::can_manage_task(access.membership()),
        "You are not authorized to manage labels for this project.",
    )?;
    Ok((access, label))
}

pub async fn index(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(filters): Query<LabelFilters>,
) -> Result<Json<LabelIndex>, AppError> {
    let access = viewable(
        &state,
        &auth,
        id,
        "You are not authorized to view labels for this project.",
    )
    .await?;
    let labels = label_service::get_project_labels(&state.pool, &access.project, &filters).await?;

    Ok(Json(LabelIndex {
        project: (&access.project).into(),
        labels,
        can_manage_labels: policy::can_manage_task(access.membership()),
        query_params: filters,
    }))
}

pub async fn create(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LabelForm>, AppError> {
    let access = managed(&state, &auth, id).await?;
    Ok(Json(LabelForm {
        project: (&access.project).into(),
        label: None,
    }))
}

pub async fn store(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let access = managed(&state, &auth, id).await?;
    let name = label_service::validate_label(&input)?;
    let label = label_service::store_label(&state.pool, &access.project, &name).await?;

    audit::log_event(
        &state.pool,
        Some(access.project.id),
        auth.user_id,
        "label.created",
        "task_label",
        Some(label.id),
        Some(json!({ "name": label.name })),
    )
    .await;

    Ok(flash(
        format!("Label '{}' created successfully.", label.name),
        labels_url(&access.project),
    ))
}

pub async fn edit(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path((id, label_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<LabelForm>, AppError> {
    let (access, label) =
        editable_label(&state, &auth, id, label_id, "Cannot edit default labels").await?;
    Ok(Json(LabelForm {
        project: (&access.project).into(),
        label: Some(label),
    }))
}

pub async fn update(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path((id, label_id)): Path<(Uuid, Uuid)>,
    input: FormInput,
) -> Result<Json<Flash>, AppError> {
    let (access, label) =
        editable_label(&state, &auth, id, label_id, "Cannot edit default labels").await?;
    let name = label_service::validate_label(&input)?;
    let label = label_service::update_label(&state.pool, &label, &name).await?;

    audit::log_event(
        &state.pool,
        Some(access.project.id),
        auth.user_id,
        "label.updated",
        "task_label",
        Some(label.id),
        Some(json!({ "name": label.name })),
    )
    .await;

    Ok(flash(
        format!("Label '{}' updated successfully.", label.name),
        labels_url(&access.project),
    ))
}

pub async fn destroy(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path((id, label_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Flash>, AppError> {
    let (access, label) =
        editable_label(&state, &auth, id, label_id, "Cannot delete default labels").await?;
    label_service::delete_label(&state.pool, &label).await?;

    audit::log_event(
        &state.pool,
        Some(access.project.id),
        auth.user_id,
        "label.deleted",
        "task_label",
        Some(label.id),
        Some(json!({ "name": label.name })),
    )
    .await;

    Ok(flash(
        format!("Label '{}' deleted successfully.", label.name),
        labels_url(&access.project),
    ))
}
