pub mod auth;
pub mod labels;
pub mod projects;
pub mod tasks;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::state::SharedState;

/// Success payload of every mutation: a message for the UI to show and where
/// to send the browser next.
#[derive(Debug, Serialize)]
pub struct Flash {
    pub message: String,
    pub redirect: String,
}

pub fn flash(message: impl Into<String>, redirect: impl Into<String>) -> Json<Flash> {
    Json(Flash {
        message: message.into(),
        redirect: redirect.into(),
    })
}

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        // Projects
        .route("/api/v1/projects", get(projects::list).post(projects::create))
        .route(
            "/api/v1/projects/{id}",
            get(projects::get)
                .put(projects::update)
                .delete(projects::delete),
        )
        .route("/api/v1/projects/{id}/image", post(projects::upload_image))
        .route("/api/v1/projects/{id}/activity", get(projects::activity))
        .route("/api/v1/projects/{id}/statuses", get(projects::statuses))
        .route("/api/v1/projects/{id}/task-labels", get(projects::task_labels))
        .route("/api/v1/projects/{id}/users", get(projects::users))
        // Invitations
        .route("/api/v1/invitations", get(projects::pending_invitations))
        .route("/api/v1/projects/{id}/invitations", post(projects::invite))
        .route(
            "/api/v1/projects/{id}/invitations/accept",
            post(projects::accept_invitation),
        )
        .route(
            "/api/v1/projects/{id}/invitations/decline",
            post(projects::decline_invitation),
        )
        // Labels
        .route(
            "/api/v1/projects/{id}/labels",
            get(labels::index).post(labels::store),
        )
        .route("/api/v1/projects/{id}/labels/create", get(labels::create))
        .route(
            "/api/v1/projects/{id}/labels/{label_id}",
            get(labels::edit).put(labels::update).delete(labels::destroy),
        )
        // Tasks
        .route("/api/v1/tasks", get(tasks::index).post(tasks::store))
        .route("/api/v1/tasks/mine", get(tasks::mine))
        .route("/api/v1/tasks/create", get(tasks::create))
        .route(
            "/api/v1/tasks/{id}",
            get(tasks::show).put(tasks::update).delete(tasks::destroy),
        )
        .route("/api/v1/tasks/{id}/edit", get(tasks::edit))
        .route("/api/v1/tasks/{id}/assign", post(tasks::assign_to_me))
        .route("/api/v1/tasks/{id}/unassign", post(tasks::unassign))
        .route(
            "/api/v1/tasks/{id}/image",
            post(tasks::upload_image).delete(tasks::delete_image),
        )
        .route("/api/v1/tasks/{id}/comments", post(tasks::add_comment))
}
