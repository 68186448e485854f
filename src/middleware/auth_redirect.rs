use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

/// Send browsers that hit a page without a valid session to the login form,
/// remembering where they were headed.
pub async fn redirect_unauthorized(req: Request, next: Next) -> Response {
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let response = next.run(req).await;
    if response.status() != StatusCode::UNAUTHORIZED {
        return response;
    }

    Redirect::to(&login_url(&target)).into_response()
}

pub fn login_url(target: &str) -> String {
    if target == "/" || target.starts_with("/auth/") {
        return "/auth/login".to_string();
    }
    let encoded: String = form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("/auth/login?next={encoded}")
}

#[cfg(test)]
mod tests {
    use super::login_url;

    #[test]
    fn keeps_the_requested_page() {
        assert_eq!(login_url("/projects/create"), "/auth/login?next=%2Fprojects%2Fcreate");
        assert_eq!(login_url("/auth/login"), "/auth/login");
        assert_eq!(login_url("/"), "/auth/login");
    }
}
