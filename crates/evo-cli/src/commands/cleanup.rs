//! `evo cleanup --from <N>`: drop broken archives and rewind the ledger.

use std::path::Path;

use evo_core::Ledger;
use evo_store::archive::README_FILE;
use evo_store::{archive_name, ObjectStore, PackArchive};
use serde::Serialize;
use tracing::{info, warn};

use super::{open_store, report_error, CommandError};
use crate::config::{env_lookup, Settings};
use crate::workflow::docs::has_error_marker;

/// Highest version the scan will look at.
pub const SCAN_LIMIT: u32 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Versions whose archives were broken and removed.
    pub deleted: Vec<u32>,
    /// Versions scanned and kept.
    pub kept: Vec<u32>,
    /// Ledger entries removed.
    pub ledger_removed: usize,
}

fn is_broken(bytes: &[u8]) -> bool {
    match PackArchive::from_zip_bytes(bytes) {
        Ok(archive) => archive.get_str(README_FILE).map(has_error_marker).unwrap_or(false),
        Err(e) => {
            warn!(error = %e, "unreadable archive");
            true
        }
    }
}

fn remove_local(folder: &Path) {
    let zip = folder.with_file_name(format!(
        "{}.zip",
        folder.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    if zip.is_file() {
        if let Err(e) = std::fs::remove_file(&zip) {
            warn!(path = %zip.display(), error = %e, "could not delete local zip");
        }
    }
    if folder.is_dir() {
        if let Err(e) = std::fs::remove_dir_all(folder) {
            warn!(path = %folder.display(), error = %e, "could not delete local folder");
        }
    }
}

/// Scan `V<from>`, `V<from+1>`, ... until the first version missing from
/// the staging bucket, delete the broken ones, then truncate the ledger
/// to versions below `from`.
pub fn cleanup(settings: &Settings, store: &dyn ObjectStore, from: u32) -> Result<CleanupReport, CommandError> {
    let bucket = settings.storage.staging_bucket.as_str();
    let stored: Vec<String> = store.list(bucket)?.into_iter().map(|o| o.name).collect();
    let mut report = CleanupReport::default();

    for version in from..SCAN_LIMIT {
        let name = archive_name(version, &settings.paths.pack_suffix);
        if !stored.contains(&name) {
            break;
        }
        let broken = match store.download(bucket, &name) {
            Ok(bytes) => is_broken(&bytes),
            Err(e) => {
                warn!(archive = %name, error = %e, "download failed");
                true
            }
        };
        if broken {
            store.delete(bucket, &name)?;
            remove_local(&settings.pack_folder(version));
            info!(version, archive = %name, "deleted broken archive");
            report.deleted.push(version);
        } else {
            report.kept.push(version);
        }
    }

    let ledger_path = settings.ledger_path();
    let mut ledger = Ledger::load(&ledger_path)?;
    report.ledger_removed = ledger.truncate_from(from);
    ledger.save(&ledger_path)?;
    info!(from, removed = report.ledger_removed, "ledger truncated");

    Ok(report)
}

pub fn cmd_cleanup(settings: &Settings, from: u32, json: bool) -> i32 {
    let store = match open_store(settings, env_lookup) {
        Ok(store) => store,
        Err(e) => return report_error(&e.into(), json),
    };
    match cleanup(settings, store.as_ref(), from) {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            } else {
                for version in &report.deleted {
                    println!("Deleted V{}", version);
                }
                println!(
                    "Scanned {} version(s), deleted {}; ledger now resumes from V{} ({} entr{} removed)",
                    report.deleted.len() + report.kept.len(),
                    report.deleted.len(),
                    from,
                    report.ledger_removed,
                    if report.ledger_removed == 1 { "y" } else { "ies" }
                );
            }
            0
        }
        Err(e) => report_error(&e, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::offline_settings;
    use chrono::Utc;
    use evo_store::archive::WORKFLOW_FILE;
    use evo_store::{LocalStore, ZIP_CONTENT_TYPE};

    fn store_pack(settings: &Settings, store: &LocalStore, version: u32, readme: &str) {
        let mut pack = PackArchive::new();
        pack.insert(WORKFLOW_FILE, "{}");
        pack.insert(README_FILE, readme);
        let zip = pack.write_pack(&settings.pack_folder(version)).unwrap();
        let name = archive_name(version, &settings.paths.pack_suffix);
        store
            .upload(&settings.storage.staging_bucket, &name, &std::fs::read(zip).unwrap(), ZIP_CONTENT_TYPE)
            .unwrap();
    }

    #[test]
    fn test_cleanup_deletes_broken_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let settings = offline_settings(dir.path());
        let store = LocalStore::new(settings.local_store_root());
        let bucket = settings.storage.staging_bucket.clone();

        store_pack(&settings, &store, 1, "# V1");
        store_pack(&settings, &store, 2, "generation error: timeout");
        store_pack(&settings, &store, 3, "# V3");
        // gap at 4 stops the scan before 5
        store_pack(&settings, &store, 5, "generation error: boom");
        store
            .upload(&bucket, &archive_name(6, &settings.paths.pack_suffix), b"garbage", ZIP_CONTENT_TYPE)
            .unwrap();

        let mut ledger = Ledger::new();
        for v in 1..=5 {
            ledger.append(v, 50, "h", Utc::now());
        }
        ledger.save(&settings.ledger_path()).unwrap();

        let report = cleanup(&settings, &store, 2).unwrap();
        assert_eq!(report.deleted, vec![2]);
        assert_eq!(report.kept, vec![3]);
        assert_eq!(report.ledger_removed, 4);

        assert!(!store.exists(&bucket, "V2_n8n_Ultimate_Pack.zip").unwrap());
        assert!(store.exists(&bucket, "V5_n8n_Ultimate_Pack.zip").unwrap());
        assert!(!settings.pack_folder(2).exists());
        assert!(!settings.packs_dir().join("V2_n8n_Ultimate_Pack.zip").exists());
        assert!(settings.pack_folder(3).exists());

        let ledger = Ledger::load(&settings.ledger_path()).unwrap();
        assert_eq!(ledger.latest_version(), Some(1));
    }

    #[test]
    fn test_unreadable_archive_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let settings = offline_settings(dir.path());
        let store = LocalStore::new(settings.local_store_root());
        let name = archive_name(1, &settings.paths.pack_suffix);
        store
            .upload(&settings.storage.staging_bucket, &name, b"not a zip", ZIP_CONTENT_TYPE)
            .unwrap();

        let report = cleanup(&settings, &store, 1).unwrap();
        assert_eq!(report.deleted, vec![1]);
        assert_eq!(report.ledger_removed, 0);
    }
}
