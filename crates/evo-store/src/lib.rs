//! Archive storage for workflow versions.
//!
//! Each accepted version is packaged as one zip archive named
//! `V<version>_<suffix>.zip` and stored in a bucket. Backends implement
//! [`ObjectStore`]; the archive layout lives in [`archive`].

pub mod archive;
pub mod backends;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use archive::PackArchive;
pub use backends::{LocalStore, SupabaseStore};

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// An object as reported by a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl StoredObject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    /// An object with that name already existed; nothing was written.
    Skipped,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object '{name}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, name: String },

    #[error("storage request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("storage transport error: {0}")]
    Transport(String),

    #[error("unexpected storage response: {0}")]
    Decode(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("walking {0}")]
    Walk(#[from] walkdir::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Bucketed object store holding version archives.
pub trait ObjectStore: Send + Sync {
    /// Backend name, for messages.
    fn name(&self) -> &'static str;

    fn list(&self, bucket: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Store `bytes` under `name`, skipping when the name already exists.
    fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<UploadOutcome, StoreError>;

    fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>, StoreError>;

    fn delete(&self, bucket: &str, name: &str) -> Result<(), StoreError>;

    fn list_buckets(&self) -> Result<Vec<String>, StoreError>;

    fn exists(&self, bucket: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.list(bucket)?.iter().any(|o| o.name == name))
    }
}

/// Archive name for a version: `V<version>_<suffix>.zip`.
pub fn archive_name(version: u32, suffix: &str) -> String {
    format!("{}.zip", pack_name(version, suffix))
}

/// Folder / stem name for a version: `V<version>_<suffix>`.
pub fn pack_name(version: u32, suffix: &str) -> String {
    format!("V{}_{}", version, suffix)
}

/// Version encoded in an archive name: the text between the leading `V`
/// and the first `_`.
pub fn parse_archive_version(name: &str) -> Option<u32> {
    let rest = name.strip_prefix('V')?;
    let (number, _) = rest.split_once('_')?;
    number.parse().ok()
}

/// Sorted, deduplicated versions present in a listing.
pub fn stored_versions(objects: &[StoredObject]) -> Vec<u32> {
    let mut versions: Vec<u32> = objects
        .iter()
        .filter_map(|o| parse_archive_version(&o.name))
        .collect();
    versions.sort_unstable();
    versions.dedup();
    versions
}
