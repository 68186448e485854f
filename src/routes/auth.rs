use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::auth::jwt::{encode_token, Claims, ACCESS_TOKEN_MINUTES};
use crate::auth::password::{self, MIN_PASSWORD_LENGTH};
use crate::config::RegistrationMode;
use crate::db;
use crate::error::AppError;
use crate::forms::FormInput;
use crate::models::User;
use crate::state::SharedState;
use crate::validation::{self, FieldErrors, MAX_NAME_LENGTH};

const SESSION_DAYS: i64 = 7;
const REMEMBER_DAYS: i64 = 30;

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub redirect: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn auth_cookies(access_token: &str, refresh_token: &str, days: i64) -> CookieJar {
    let access = Cookie::build(("access_token", access_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(ACCESS_TOKEN_MINUTES))
        .build();

    let refresh = Cookie::build(("refresh_token", refresh_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(days))
        .build();

    CookieJar::new().add(access).add(refresh)
}

fn clear_auth_cookies() -> CookieJar {
    let access = Cookie::build(("access_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    let refresh = Cookie::build(("refresh_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    CookieJar::new().add(access).add(refresh)
}

fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Issue an access token and a fresh refresh token living `days` days. The
/// lifetime is stored with the token, so a rotation keeps the original span.
async fn issue_session(
    state: &SharedState,
    user: &User,
    days: i64,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let claims = Claims::new(user.id, user.name.clone());
    let access_token =
        encode_token(&claims, &state.config.jwt_secret).map_err(AppError::Internal)?;

    let refresh = generate_refresh_token();
    db::refresh_tokens::create(
        &state.pool,
        user.id,
        &hash_token(&refresh),
        Utc::now() + Duration::days(days),
    )
    .await?;

    let jar = auth_cookies(&access_token, &refresh, days);
    Ok((
        jar,
        Json(AuthResponse {
            access_token,
            refresh_token: refresh,
            redirect: "/dashboard".to_string(),
        }),
    ))
}

pub async fn register(
    State(state): State<SharedState>,
    input: FormInput,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let mut errors = FieldErrors::new();
    let name = validation::required_string(&mut errors, "name", input.text("name"), MAX_NAME_LENGTH);
    let email = validation::email(&mut errors, "email", input.text("email"));
    let plain = input.text("password").unwrap_or_default();
    if plain.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("The password field must be at least {MIN_PASSWORD_LENGTH} characters."),
        );
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let pw_hash = password::hash(plain).map_err(AppError::Internal)?;

    // Advisory lock serialises the "first user" check under closed registration
    let mut tx = state.pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock(1)")
        .execute(&mut *tx)
        .await?;

    if state.config.registration == RegistrationMode::Closed
        && db::users::count_all(&mut *tx).await? > 0
    {
        return Err(AppError::Forbidden(
            "Registration is disabled. Contact your system administrator.".to_string(),
        ));
    }

    let user = db::users::create(&mut *tx, &email, &pw_hash, &name)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                let mut errors = FieldErrors::new();
                errors.add("email", "The email has already been taken.");
                AppError::Validation(errors)
            }
            _ => AppError::Database(e),
        })?;

    tx.commit().await?;

    tracing::info!("Registered user {}", user.id);
    issue_session(&state, &user, SESSION_DAYS).await
}

pub async fn login(
    State(state): State<SharedState>,
    input: FormInput,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let mut errors = FieldErrors::new();
    let email = validation::email(&mut errors, "email", input.text("email"));
    let plain = input.text("password").unwrap_or_default();
    if plain.is_empty() {
        errors.add("password", "The password field is required.");
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if state.login_limiter.check(&email).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let Some(user) = db::users::find_by_email(&state.pool, &email).await? else {
        state.login_limiter.record_failure(&email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    };

    let valid = password::verify(plain, &user.password_hash).map_err(AppError::Internal)?;
    if !valid {
        state.login_limiter.record_failure(&email);
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    state.login_limiter.reset(&email);
    let days = if input.flag("remember") { REMEMBER_DAYS } else { SESSION_DAYS };
    issue_session(&state, &user, days).await
}

pub async fn refresh(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let refresh_value = jar
        .get("refresh_token")
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let stored = db::refresh_tokens::find_by_hash(&state.pool, &hash_token(&refresh_value))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    if stored.used {
        tracing::warn!(
            "Refresh token reuse detected for user {}. Revoking all sessions.",
            stored.user_id
        );
        db::refresh_tokens::delete_all_for_user(&state.pool, stored.user_id).await?;
        return Err(AppError::Unauthorized(
            "Refresh token reuse detected. All sessions revoked.".to_string(),
        ));
    }

    if stored.expires_at < Utc::now() {
        return Err(AppError::Unauthorized("Refresh token expired".to_string()));
    }

    db::refresh_tokens::mark_used(&state.pool, stored.id).await?;

    let user = db::users::find_by_id(&state.pool, stored.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let days = (stored.expires_at - stored.created_at).num_days().max(1);
    issue_session(&state, &user, days).await
}

pub async fn logout(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    if let Some(cookie) = jar.get("refresh_token") {
        db::refresh_tokens::delete_by_hash(&state.pool, &hash_token(cookie.value())).await?;
    }

    Ok((
        clear_auth_cookies(),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}
