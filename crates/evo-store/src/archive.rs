//! Version archive layout.
//!
//! A pack is a flat set of named files. It is written to a folder on disk
//! and zipped from there, so the folder stays around as the readable copy
//! of the version.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::StoreError;

pub const WORKFLOW_FILE: &str = "workflow.json";
pub const SCORE_FILE: &str = "score.txt";
pub const README_FILE: &str = "README.md";
pub const LOGIC_MAP_FILE: &str = "logic_map.md";
pub const DEPLOYMENT_FILE: &str = "deployment.md";
pub const NODE_SUGGESTIONS_FILE: &str = "node_suggestions.md";
pub const VALIDATION_FILE: &str = "validation.md";
pub const FEEDBACK_FILE: &str = "feedback_injection.md";
pub const SELF_PROMPT_FILE: &str = "self_prompt.md";
pub const NODE_SUMMARY_FILE: &str = "node_summary.md";
pub const AUTO_EVAL_FILE: &str = "auto_eval.md";

/// In-memory contents of one version archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackArchive {
    files: BTreeMap<String, Vec<u8>>,
}

impl PackArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(name.to_string(), contents.into());
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Write every file into `folder` (created if needed).
    pub fn write_folder(&self, folder: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(folder).map_err(|e| StoreError::io(folder, e))?;
        for (name, contents) in &self.files {
            let path = folder.join(name);
            std::fs::write(&path, contents).map_err(|e| StoreError::io(&path, e))?;
        }
        Ok(())
    }

    /// Write the folder and zip it next to itself as `<folder>.zip`.
    pub fn write_pack(&self, folder: &Path) -> Result<PathBuf, StoreError> {
        self.write_folder(folder)?;
        let mut zip_path = folder.as_os_str().to_owned();
        zip_path.push(".zip");
        let zip_path = PathBuf::from(zip_path);
        zip_folder(folder, &zip_path)?;
        Ok(zip_path)
    }

    /// Read every file entry of a zip archive. Entries nested in a
    /// directory are keyed by their file name.
    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut pack = Self::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry
                .name()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| StoreError::io(&name, e))?;
            pack.files.insert(name, contents);
        }
        Ok(pack)
    }
}

/// Zip every file under `folder`, stored with paths relative to it.
pub fn zip_folder(folder: &Path, zip_path: &Path) -> Result<(), StoreError> {
    let file = File::create(zip_path).map_err(|e| StoreError::io(zip_path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(folder).unwrap_or(entry.path());
        let name = relative.to_string_lossy().replace('\\', "/");
        let contents = std::fs::read(entry.path()).map_err(|e| StoreError::io(entry.path(), e))?;
        zip.start_file(name, options)?;
        zip.write_all(&contents).map_err(|e| StoreError::io(zip_path, e))?;
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackArchive {
        let mut pack = PackArchive::new();
        pack.insert(WORKFLOW_FILE, r#"{"nodes": [], "connections": {}}"#);
        pack.insert(SCORE_FILE, "64/100");
        pack.insert(README_FILE, "# V1\n");
        pack
    }

    #[test]
    fn test_write_pack_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("V1_pack");
        let pack = sample();

        let zip_path = pack.write_pack(&folder).unwrap();
        assert_eq!(zip_path, dir.path().join("V1_pack.zip"));
        assert!(folder.join(SCORE_FILE).is_file());

        let bytes = std::fs::read(&zip_path).unwrap();
        let read = PackArchive::from_zip_bytes(&bytes).unwrap();
        assert_eq!(read, pack);
        assert_eq!(read.get_str(SCORE_FILE), Some("64/100"));
    }

    #[test]
    fn test_nested_entries_keyed_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("pack");
        std::fs::create_dir_all(folder.join("inner")).unwrap();
        std::fs::write(folder.join("inner").join(README_FILE), "hello").unwrap();
        let zip_path = dir.path().join("pack.zip");
        zip_folder(&folder, &zip_path).unwrap();

        let read = PackArchive::from_zip_bytes(&std::fs::read(&zip_path).unwrap()).unwrap();
        assert_eq!(read.get_str(README_FILE), Some("hello"));
    }

    #[test]
    fn test_garbage_is_an_archive_error() {
        assert!(matches!(
            PackArchive::from_zip_bytes(b"not a zip"),
            Err(StoreError::Archive(_))
        ));
    }
}
