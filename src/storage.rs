use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use crate::forms::UploadedFile;

#[derive(Debug)]
pub struct StorageError {
    pub message: String,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<String> for StorageError {
    fn from(s: String) -> Self {
        StorageError { message: s }
    }
}

/// Where uploaded images live. Keys are relative, slash-separated paths such
/// as `tasks/0190…/cover.png`; they are what the database stores.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError>;
    /// Deleting a key that does not exist is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// A fresh key under `prefix` that keeps the upload's extension.
pub fn image_key(prefix: &str, owner: Uuid, file: &UploadedFile) -> String {
    let ext = file
        .extension()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    format!("{prefix}/{owner}/{}.{ext}", Uuid::now_v7())
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let path = Path::new(key);
    let clean = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(())
    } else {
        Err(format!("Invalid storage key: {key}").into())
    }
}

/// Files under a root directory on local disk.
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ImageStorage for LocalDiskStorage {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to delete {}: {e}", path.display()).into()),
        }
    }
}

/// Keeps images in memory. Used by tests and throwaway deployments.
#[derive(Default)]
pub struct MemoryStorage {
    objects: DashMap<String, Bytes>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ImageStorage for MemoryStorage {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> UploadedFile {
        UploadedFile {
            field: "image".to_string(),
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: Bytes::from_static(b"img"),
        }
    }

    #[test]
    fn keys_keep_lowercased_extension() {
        let owner = Uuid::now_v7();
        let key = image_key("tasks", owner, &upload("Cover.PNG"));
        assert!(key.starts_with(&format!("tasks/{owner}/")));
        assert!(key.ends_with(".png"));
    }

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs/path.png").is_err());
        assert!(validate_key("").is_err());
        assert!(validate_key("projects/a/b.png").is_ok());
    }

    #[tokio::test]
    async fn memory_put_and_delete() {
        let storage = MemoryStorage::new();
        storage.put("tasks/x/a.png", Bytes::from_static(b"1")).await.unwrap();
        assert!(storage.contains("tasks/x/a.png"));
        storage.delete("tasks/x/a.png").await.unwrap();
        storage.delete("tasks/x/a.png").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn local_disk_round_trip() {
        let root = std::env::temp_dir().join(format!("taskboard-storage-{}", Uuid::now_v7()));
        let storage = LocalDiskStorage::new(&root);
        storage.put("projects/p/logo.png", Bytes::from_static(b"png")).await.unwrap();
        assert!(root.join("projects/p/logo.png").exists());
        storage.delete("projects/p/logo.png").await.unwrap();
        assert!(!root.join("projects/p/logo.png").exists());
        storage.delete("projects/p/logo.png").await.unwrap();
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
