use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::forms::FormInput;
use crate::models::{Project, TaskLabel};
use crate::validation::{self, FieldErrors, MAX_NAME_LENGTH};

/// `name` on the label index, `query` on the task form's label picker. Both
/// mean the same substring match; a non-blank `name` wins over `query`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LabelFilters {
    pub name: Option<String>,
    pub query: Option<String>,
}

impl LabelFilters {
    fn pattern(&self) -> Option<String> {
        [self.name.as_deref(), self.query.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|term| !term.is_empty())
            .map(db::like_pattern)
    }
}

pub async fn get_project_labels(
    pool: &PgPool,
    project: &Project,
    filters: &LabelFilters,
) -> Result<Vec<TaskLabel>, AppError> {
    let pattern = filters.pattern();
    Ok(db::task_labels::list_available(pool, Some(project.id), pattern.as_deref()).await?)
}

/// Resolve a label addressed through `project`. Labels owned by another
/// project are reported as missing; global labels resolve from any project.
pub async fn find_project_label(
    pool: &PgPool,
    project: &Project,
    label_id: Uuid,
) -> Result<TaskLabel, AppError> {
    db::task_labels::find_by_id(pool, label_id)
        .await?
        .filter(|label| label.project_id.is_none_or(|owner| owner == project.id))
        .ok_or_else(|| AppError::NotFound("Label not found".to_string()))
}

pub fn validate_label(input: &FormInput) -> Result<String, FieldErrors> {
    let mut errors = FieldErrors::new();
    let name = validation::required_string(&mut errors, "name", input.text("name"), MAX_NAME_LENGTH);
    errors.finish(name)
}

fn duplicate_name(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            let mut errors = FieldErrors::new();
            errors.add("name", "A label with this name already exists.");
            AppError::Validation(errors)
        }
        _ => AppError::Database(err),
    }
}

pub async fn store_label(pool: &PgPool, project: &Project, name: &str) -> Result<TaskLabel, AppError> {
    db::task_labels::create(pool, project.id, name)
        .await
        .map_err(duplicate_name)
}

pub async fn update_label(pool: &PgPool, label: &TaskLabel, name: &str) -> Result<TaskLabel, AppError> {
    db::task_labels::update(pool, label.id, name)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Label not found".to_string()),
            other => duplicate_name(other),
        })
}

pub async fn delete_label(pool: &PgPool, label: &TaskLabel) -> Result<(), AppError> {
    match db::task_labels::delete(pool, label.id).await? {
        0 => Err(AppError::NotFound("Label not found".to_string())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn name_filter_takes_precedence_over_query() {
        let filters = LabelFilters {
            name: Some("Doc".to_string()),
            query: Some("bug".to_string()),
        };
        assert_eq!(filters.pattern().as_deref(), Some("%Doc%"));

        let filters = LabelFilters {
            name: Some("   ".to_string()),
            query: None,
        };
        assert_eq!(filters.pattern(), None);
    }

    #[test]
    fn blank_name_falls_back_to_query() {
        let filters = LabelFilters {
            name: Some(String::new()),
            query: Some(" bug ".to_string()),
        };
        assert_eq!(filters.pattern().as_deref(), Some("%bug%"));
    }

    #[test]
    fn label_name_is_required_and_bounded() {
        let input = FormInput::from_json(&json!({ "name": "" })).unwrap();
        assert!(validate_label(&input).unwrap_err().has("name"));

        let input = FormInput::from_json(&json!({ "name": "x".repeat(256) })).unwrap();
        assert!(validate_label(&input).unwrap_err().has("name"));

        let input = FormInput::from_json(&json!({ "name": "  Backend " })).unwrap();
        assert_eq!(validate_label(&input).unwrap(), "Backend");
    }
}
