use askama::Template;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::db::tasks::{SortColumn, SortOrder, TaskQuery};
use crate::error::AppError;
use crate::state::SharedState;
use crate::views::render;

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    user_name: String,
    projects: Vec<ProjectRow>,
    invitations: Vec<InvitationRow>,
    open_tasks: i64,
}

struct ProjectRow {
    name: String,
    status: &'static str,
    due_date: String,
    role: &'static str,
}

struct InvitationRow {
    project_id: String,
    project_name: String,
    role: String,
}

pub async fn index(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let projects = db::projects::list_accessible(&state.pool, auth.user_id)
        .await?
        .into_iter()
        .map(|p| ProjectRow {
            status: p.project.status.label(),
            due_date: p
                .project
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            role: p.role.as_str(),
            name: p.project.name,
        })
        .collect();

    let invitations = db::memberships::pending_for_user(&state.pool, auth.user_id)
        .await?
        .into_iter()
        .map(|(id, project_name, role)| InvitationRow {
            project_id: id.to_string(),
            project_name,
            role,
        })
        .collect();

    let open_tasks = db::tasks::count(
        &state.pool,
        &TaskQuery {
            viewer: auth.user_id,
            assigned_to: Some(auth.user_id),
            name_pattern: None,
            status_id: None,
            project_id: None,
            label_id: None,
            sort_by: SortColumn::CreatedAt,
            sort_order: SortOrder::Desc,
            limit: 0,
            offset: 0,
        },
    )
    .await?;

    render(&DashboardTemplate {
        user_name: auth.name,
        projects,
        invitations,
        open_tasks,
    })
}
