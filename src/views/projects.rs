use askama::Template;
use axum::response::IntoResponse;

use crate::auth::extractor::AuthUser;
use crate::error::AppError;
use crate::models::ProjectStatus;
use crate::validation::MAX_IMAGE_KILOBYTES;
use crate::views::render;

#[derive(Template)]
#[template(path = "projects/create.html")]
struct CreateProjectTemplate {
    user_name: String,
    statuses: Vec<(&'static str, &'static str)>,
    max_image_kb: usize,
}

pub async fn create_page(auth: AuthUser) -> Result<impl IntoResponse, AppError> {
    render(&CreateProjectTemplate {
        user_name: auth.name,
        statuses: ProjectStatus::ALL
            .iter()
            .map(|s| (s.as_str(), s.label()))
            .collect(),
        max_image_kb: MAX_IMAGE_KILOBYTES,
    })
}
