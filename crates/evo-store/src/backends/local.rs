//! Filesystem backend: each bucket is a directory under a root.

use std::path::PathBuf;

use crate::{ObjectStore, StoreError, StoredObject, UploadOutcome};

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn list(&self, bucket: &str) -> Result<Vec<StoredObject>, StoreError> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let mut objects = Vec::new();
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            objects.push(StoredObject {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: Some(meta.len()),
                updated_at: None,
            });
        }
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<UploadOutcome, StoreError> {
        let dir = self.bucket_dir(bucket);
        let path = dir.join(name);
        if path.exists() {
            return Ok(UploadOutcome::Skipped);
        }
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        std::fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
        Ok(UploadOutcome::Uploaded)
    }

    fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.bucket_dir(bucket).join(name);
        if !path.is_file() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                name: name.to_string(),
            });
        }
        std::fs::read(&path).map_err(|e| StoreError::io(&path, e))
    }

    fn delete(&self, bucket: &str, name: &str) -> Result<(), StoreError> {
        let path = self.bucket_dir(bucket).join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let mut buckets: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        buckets.sort();
        Ok(buckets)
    }
}
