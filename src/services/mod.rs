pub mod labels;
pub mod projects;
pub mod tasks;

use uuid::Uuid;

use crate::error::AppError;
use crate::forms::UploadedFile;
use crate::storage::{self, ImageStorage};

/// Upload `file` under a fresh key below `prefix/owner` and return the key.
/// Nothing in the database refers to it yet.
pub(crate) async fn store_image(
    storage: &dyn ImageStorage,
    prefix: &str,
    owner: Uuid,
    file: &UploadedFile,
) -> Result<String, AppError> {
    let key = storage::image_key(prefix, owner, file);
    storage
        .put(&key, file.bytes.clone())
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store image {key}: {e}")))?;
    Ok(key)
}

/// Remove a file no row points at any more. Failures only leave an orphan
/// behind, so they are logged and swallowed.
pub(crate) async fn discard_image(storage: &dyn ImageStorage, key: &str) {
    if let Err(e) = storage.delete(key).await {
        tracing::warn!("Failed to delete image {key}: {e}");
    }
}

/// Run the database write for an upload that already sits in storage. When
/// the write fails the new file is discarded; when it succeeds the file it
/// replaced is.
pub(crate) async fn commit_image<T>(
    storage: &dyn ImageStorage,
    new_key: Option<&str>,
    replaced: Option<&str>,
    write: Result<T, AppError>,
) -> Result<T, AppError> {
    match (&write, new_key) {
        (Err(_), Some(key)) => discard_image(storage, key).await,
        (Ok(_), Some(_)) => {
            if let Some(old) = replaced {
                discard_image(storage, old).await;
            }
        }
        (_, None) => {}
    }
    write
}
