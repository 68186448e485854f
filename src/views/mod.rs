pub mod auth;
pub mod dashboard;
pub mod projects;

use askama::Template;
use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::error::AppError;
use crate::state::SharedState;

pub fn view_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(auth::login_page))
        .route("/auth/login", get(auth::login_page))
        .route("/auth/register", get(auth::register_page))
        .route("/dashboard", get(dashboard::index))
        .route("/projects/create", get(projects::create_page))
}

pub(crate) fn render<T: Template>(template: &T) -> Result<Html<String>, AppError> {
    template
        .render()
        .map(Html)
        .map_err(|e| AppError::Internal(format!("Template render failed: {e}")))
}
