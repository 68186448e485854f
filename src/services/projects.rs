use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::db::projects::{NewProject, ProjectChanges};
use crate::error::AppError;
use crate::forms::{FormInput, UploadedFile};
use crate::models::{InvitationStatus, Membership, Project, ProjectRole, ProjectStatus, ProjectUser};
use crate::policy;
use crate::state::AppState;
use crate::services;
use crate::validation::{self, FieldErrors, MAX_NAME_LENGTH};

/// A project together with the acting user's membership row on it, if any.
pub struct ProjectAccess {
    pub project: Project,
    pub membership: Option<Membership>,
}

impl ProjectAccess {
    pub fn membership(&self) -> Option<&Membership> {
        self.membership.as_ref()
    }
}

pub async fn load_access(pool: &PgPool, project_id: Uuid, actor: Uuid) -> Result<ProjectAccess, AppError> {
    let project = db::projects::find_by_id(pool, project_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    let membership = db::memberships::find(pool, project.id, actor).await?;
    Ok(ProjectAccess { project, membership })
}

/// Validated fields of the project form.
#[derive(Debug, Clone)]
pub struct ProjectInput {
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub due_date: Option<NaiveDate>,
}

pub fn validate_project(input: &FormInput, max_image_kb: usize) -> Result<ProjectInput, FieldErrors> {
    let mut errors = FieldErrors::new();
    let name = validation::required_string(&mut errors, "name", input.text("name"), MAX_NAME_LENGTH);
    let description = validation::optional_string(input.text("description"));
    let due_date = validation::optional_date(&mut errors, "due_date", input.text("due_date"));

    let status = match input.text("status").map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            errors.add("status", "The status field is required.");
            ProjectStatus::Pending
        }
        Some(raw) => ProjectStatus::parse(raw).unwrap_or_else(|| {
            errors.add("status", "The selected status is invalid.");
            ProjectStatus::Pending
        }),
    };

    if let Some(file) = input.file("image") {
        validation::image(&mut errors, "image", file, max_image_kb);
    }

    errors.finish(ProjectInput {
        name,
        description,
        status,
        due_date,
    })
}

/// Create the project, make the creator its accepted manager and seed the
/// default statuses, all in one transaction. The image is stored first and
/// removed again if the transaction fails.
pub async fn create_project(
    state: &AppState,
    actor: Uuid,
    input: &ProjectInput,
    image: Option<&UploadedFile>,
) -> Result<Project, AppError> {
    let image_path = match image {
        Some(file) => Some(services::store_image(&*state.storage, "projects", actor, file).await?),
        None => None,
    };

    let result = insert_project(&state.pool, actor, input, image_path.as_deref()).await;
    services::commit_image(&*state.storage, image_path.as_deref(), None, result).await
}

async fn insert_project(
    pool: &PgPool,
    actor: Uuid,
    input: &ProjectInput,
    image_path: Option<&str>,
) -> Result<Project, AppError> {
    let mut tx = pool.begin().await?;

    let project = db::projects::create(
        &mut *tx,
        &NewProject {
            name: &input.name,
            description: input.description.as_deref(),
            status: input.status,
            due_date: input.due_date,
            image_path,
            created_by: actor,
        },
    )
    .await?;

    db::memberships::create(
        &mut *tx,
        project.id,
        actor,
        ProjectRole::Manager,
        InvitationStatus::Accepted,
        None,
    )
    .await?;

    db::task_statuses::seed_defaults(&mut *tx, project.id).await?;

    tx.commit().await?;
    Ok(project)
}

/// Apply the form to the project. A new image is uploaded before the row is
/// touched and goes out with the same UPDATE, so a failed upload changes
/// nothing.
pub async fn update_project(
    state: &AppState,
    actor: Uuid,
    project: &Project,
    input: &ProjectInput,
    image: Option<&UploadedFile>,
) -> Result<Project, AppError> {
    let new_key = match image {
        Some(file) => Some(services::store_image(&*state.storage, "projects", project.id, file).await?),
        None => None,
    };

    let result = db::projects::update(
        &state.pool,
        project.id,
        &ProjectChanges {
            name: &input.name,
            description: input.description.as_deref(),
            status: input.status,
            due_date: input.due_date,
            image_path: new_key.as_deref().or(project.image_path.as_deref()),
            updated_by: actor,
        },
    )
    .await
    .map_err(AppError::from);

    services::commit_image(
        &*state.storage,
        new_key.as_deref(),
        project.image_path.as_deref(),
        result,
    )
    .await
}

/// Store a new cover image and point the project at it. The previous file is
/// removed once the row no longer references it.
pub async fn replace_image(
    state: &AppState,
    actor: Uuid,
    project: &Project,
    file: &UploadedFile,
) -> Result<String, AppError> {
    let key = services::store_image(&*state.storage, "projects", project.id, file).await?;

    let result = db::projects::set_image_path(&state.pool, project.id, Some(&key), actor)
        .await
        .map_err(AppError::from);
    services::commit_image(&*state.storage, Some(&key), project.image_path.as_deref(), result).await?;
    Ok(key)
}

/// Delete the project row (cascading to tasks, labels and memberships), then
/// the images that belonged to it.
pub async fn delete_project(state: &AppState, project: &Project) -> Result<(), AppError> {
    let mut images = db::tasks::image_paths_for_project(&state.pool, project.id).await?;
    images.extend(project.image_path.clone());

    db::projects::delete(&state.pool, project.id).await?;

    for key in images {
        if let Err(e) = state.storage.delete(&key).await {
            tracing::warn!("Failed to delete image {key} of project {}: {e}", project.id);
        }
    }
    Ok(())
}

/// Users offered as assignees. A plain member only ever sees themselves.
pub async fn project_users(
    pool: &PgPool,
    actor: Uuid,
    access: &ProjectAccess,
) -> Result<Vec<ProjectUser>, AppError> {
    let users = db::memberships::accepted_users(pool, access.project.id).await?;
    if policy::is_project_member(access.membership()) {
        return Ok(users.into_iter().filter(|u| u.id == actor).collect());
    }
    Ok(users)
}

#[derive(Debug, Clone)]
pub struct InviteInput {
    pub email: String,
    pub role: ProjectRole,
}

pub fn validate_invite(input: &FormInput) -> Result<InviteInput, FieldErrors> {
    let mut errors = FieldErrors::new();
    let email = validation::email(&mut errors, "email", input.text("email"));
    let role = match input.text("role").map(str::trim).filter(|r| !r.is_empty()) {
        None => ProjectRole::Member,
        Some(raw) => ProjectRole::parse(raw).unwrap_or_else(|| {
            errors.add("role", "The selected role is invalid.");
            ProjectRole::Member
        }),
    };
    errors.finish(InviteInput { email, role })
}

pub async fn invite(
    pool: &PgPool,
    actor: Uuid,
    project: &Project,
    input: &InviteInput,
) -> Result<Membership, AppError> {
    let invitee = db::users::find_by_email(pool, &input.email).await?.ok_or_else(|| {
        let mut errors = FieldErrors::new();
        errors.add("email", "No user is registered with this email address.");
        AppError::Validation(errors)
    })?;

    let membership = db::memberships::invite(pool, project.id, invitee.id, input.role, actor).await?;
    match membership.status {
        InvitationStatus::Accepted => Err(AppError::Conflict(
            "This user is already a member of the project.".to_string(),
        )),
        _ => Ok(membership),
    }
}
