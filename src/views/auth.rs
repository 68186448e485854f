use askama::Template;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::auth::jwt;
use crate::error::AppError;
use crate::state::SharedState;
use crate::views::render;

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    error: Option<String>,
    next: String,
}

#[derive(Template)]
#[template(path = "auth/register.html")]
struct RegisterTemplate {}

#[derive(Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

/// Only same-site paths are honoured as a post-login destination.
fn safe_next(next: Option<String>) -> String {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//"))
        .unwrap_or_default()
}

fn signed_in(state: &SharedState, jar: &CookieJar) -> bool {
    jar.get("access_token")
        .is_some_and(|cookie| jwt::decode_token(cookie.value(), &state.config.jwt_secret).is_ok())
}

pub async fn login_page(
    State(state): State<SharedState>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if signed_in(&state, &jar) {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let template = LoginTemplate {
        error: None,
        next: safe_next(query.next),
    };
    Ok(render(&template)?.into_response())
}

pub async fn register_page(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if signed_in(&state, &jar) {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    Ok(render(&RegisterTemplate {})?.into_response())
}

#[cfg(test)]
mod tests {
    use super::safe_next;

    #[test]
    fn rejects_offsite_targets() {
        assert_eq!(safe_next(Some("/projects/create".to_string())), "/projects/create");
        assert_eq!(safe_next(Some("//evil.example".to_string())), "");
        assert_eq!(safe_next(Some("https://evil.example".to_string())), "");
        assert_eq!(safe_next(None), "");
    }
}
