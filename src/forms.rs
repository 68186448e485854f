//! Request bodies that may arrive as JSON, urlencoded or multipart forms.
//!
//! Browser forms with file inputs post `multipart/form-data`, API clients post
//! JSON. Both are flattened into the same field map so validation does not
//! care which one was used. A JSON `null` becomes an empty value, the same
//! thing a cleared form input submits.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use serde_json::Value;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

#[derive(Debug, Default, Clone)]
pub struct FormInput {
    fields: HashMap<String, Vec<String>>,
    files: Vec<UploadedFile>,
}

impl FormInput {
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.text(name), Some("1" | "true" | "on" | "yes"))
    }

    /// The uploaded file for `name`; an empty file input counts as absent.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files
            .iter()
            .find(|f| f.field == name && !f.bytes.is_empty())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(value.into());
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("Expected a JSON object".to_string());
        };
        let mut input = FormInput::default();
        for (key, value) in map {
            match value {
                Value::Null => input.insert(key, ""),
                Value::Array(items) => {
                    let entry = input.fields.entry(key.clone()).or_default();
                    entry.extend(items.iter().filter_map(scalar_to_string));
                }
                other => {
                    if let Some(s) = scalar_to_string(other) {
                        input.insert(key, s);
                    }
                }
            }
        }
        Ok(input)
    }

    pub fn from_urlencoded(body: &[u8]) -> Self {
        let mut input = FormInput::default();
        for (key, value) in form_urlencoded::parse(body) {
            input.insert(&normalize_key(&key), value.into_owned());
        }
        input
    }

    pub async fn from_multipart(headers: &HeaderMap, body: Bytes) -> Result<Self, String> {
        let boundary = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| multer::parse_boundary(ct).ok())
            .ok_or_else(|| "Missing multipart boundary".to_string())?;

        let stream = futures_util::stream::once(async { Ok::<_, std::io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut input = FormInput::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| format!("Multipart error: {e}"))?
        {
            let name = normalize_key(field.name().unwrap_or("unknown"));
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field.content_type().map(|m| m.essence_str().to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("File read error: {e}"))?;
                input.files.push(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    bytes,
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| format!("Field read error: {e}"))?;
                input.insert(&name, value);
            }
        }
        Ok(input)
    }
}

/// `label_ids[]` and `label_ids` name the same list.
fn normalize_key(key: &str) -> String {
    key.strip_suffix("[]").unwrap_or(key).to_string()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl<S> FromRequest<S> for FormInput
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let headers = req.headers().clone();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("Unable to read body: {e}")))?;

        if content_type.contains("multipart/form-data") {
            FormInput::from_multipart(&headers, body)
                .await
                .map_err(AppError::BadRequest)
        } else if content_type.contains("application/x-www-form-urlencoded") {
            Ok(FormInput::from_urlencoded(&body))
        } else if body.is_empty() {
            Ok(FormInput::default())
        } else {
            let value: Value = serde_json::from_slice(&body)
                .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))?;
            FormInput::from_json(&value).map_err(AppError::BadRequest)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn json_scalars_and_arrays_flatten() {
        let input = FormInput::from_json(&json!({
            "name": "Ship it",
            "label_ids": ["a", "b"],
            "remember": true,
            "assigned_user_id": null,
        }))
        .unwrap();

        assert_eq!(input.text("name"), Some("Ship it"));
        assert_eq!(input.list("label_ids").unwrap(), ["a", "b"]);
        assert!(input.flag("remember"));
        assert!(input.contains("assigned_user_id"));
        assert_eq!(input.text("assigned_user_id"), Some(""));
    }

    #[test]
    fn urlencoded_brackets_collapse() {
        let input = FormInput::from_urlencoded(b"label_ids%5B%5D=x&label_ids%5B%5D=y&name=Hi");
        assert_eq!(input.list("label_ids").unwrap(), ["x", "y"]);
        assert_eq!(input.text("name"), Some("Hi"));
    }

    #[tokio::test]
    async fn multipart_separates_files_from_text() {
        let body = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"name\"\r\n\r\n",
            "Website relaunch\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"image\"; filename=\"cover.png\"\r\n",
            "Content-Type: image/png\r\n\r\n",
            "PNGDATA\r\n",
            "--XYZ--\r\n",
        );
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "multipart/form-data; boundary=XYZ".parse().unwrap());

        let input = FormInput::from_multipart(&headers, Bytes::from(body)).await.unwrap();
        assert_eq!(input.text("name"), Some("Website relaunch"));
        let file = input.file("image").unwrap();
        assert_eq!(file.file_name, "cover.png");
        assert_eq!(file.extension(), Some("png"));
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
        assert_eq!(&file.bytes[..], b"PNGDATA");
    }
}
