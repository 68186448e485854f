//! Per-field input validation.
//!
//! Validators collect every failure into [`FieldErrors`] instead of stopping
//! at the first one, so a form can highlight all offending inputs at once.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::forms::UploadedFile;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_COMMENT_LENGTH: usize = 5000;
pub const MAX_IMAGE_KILOBYTES: usize = 2048;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpeg", "png", "jpg", "webp", "svg"];
const IMAGE_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/svg+xml"];

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(value)` when nothing was recorded, the collected errors otherwise.
    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

fn human(field: &str) -> String {
    field.replace('_', " ")
}

/// Trimmed, non-empty, at most `max` characters.
pub fn required_string(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max: usize,
) -> String {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        errors.add(field, format!("The {} field is required.", human(field)));
    } else if value.chars().count() > max {
        errors.add(
            field,
            format!("The {} field must not be greater than {max} characters.", human(field)),
        );
    }
    value.to_string()
}

/// Empty strings are treated as absent.
pub fn optional_string(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn required_uuid(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<Uuid> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            errors.add(field, format!("The {} field is required.", human(field)));
            None
        }
        Some(raw) => parse_uuid(errors, field, raw),
    }
}

pub fn optional_uuid(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<Uuid> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|raw| parse_uuid(errors, field, raw))
}

fn parse_uuid(errors: &mut FieldErrors, field: &str, raw: &str) -> Option<Uuid> {
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.add(field, format!("The {} field must be a valid UUID.", human(field)));
            None
        }
    }
}

pub fn optional_integer(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<i64> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty())?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.add(field, format!("The {} field must be an integer.", human(field)));
            None
        }
    }
}

pub fn uuid_list(errors: &mut FieldErrors, field: &str, values: Option<&[String]>) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for raw in values.unwrap_or_default() {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {}
            Err(_) => {
                errors.add(field, format!("The {} field contains an invalid id.", human(field)));
                break;
            }
        }
    }
    ids
}

/// Accepts a plain `YYYY-MM-DD` date or a full RFC 3339 timestamp, which is
/// what browser date pickers send.
pub fn optional_date(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<NaiveDate> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty())?;
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    errors.add(field, format!("The {} field must be a valid date.", human(field)));
    None
}

pub fn email(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> String {
    let value = required_string(errors, field, value, MAX_NAME_LENGTH);
    if !value.is_empty() && !looks_like_email(&value) {
        errors.add(field, format!("The {} field must be a valid email address.", human(field)));
    }
    value.to_lowercase()
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

/// Image uploads: jpeg, png, jpg, webp or svg, at most 2048 KB.
pub fn image(errors: &mut FieldErrors, field: &str, file: &UploadedFile, max_kilobytes: usize) {
    let extension = file
        .extension()
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let mime_ok = file
        .content_type
        .as_deref()
        .is_none_or(|ct| IMAGE_MIME_TYPES.contains(&ct));

    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) || !mime_ok {
        errors.add(field, format!("The {} field must be an image.", human(field)));
        errors.add(
            field,
            format!(
                "The {} field must be a file of type: {}.",
                human(field),
                IMAGE_EXTENSIONS.join(", ")
            ),
        );
    }

    if file.bytes.len() > max_kilobytes * 1024 {
        errors.add(
            field,
            format!("The {} field must not be greater than {max_kilobytes} kilobytes.", human(field)),
        );
    }
}
