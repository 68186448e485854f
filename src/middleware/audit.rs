use sqlx::PgPool;
use uuid::Uuid;

/// Record an audit event. Called explicitly by handlers after a mutation
/// succeeds; a failure to write the event is logged, never surfaced.
pub async fn log_event(
    pool: &PgPool,
    project_id: Option<Uuid>,
    user_id: Uuid,
    action: &str,
    resource_type: &str,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) {
    if let Err(e) = crate::db::audit::log_event(
        pool,
        project_id,
        Some(user_id),
        action,
        resource_type,
        resource_id,
        details,
    )
    .await
    {
        tracing::error!("Failed to log audit event {action}: {e}");
    }
}
