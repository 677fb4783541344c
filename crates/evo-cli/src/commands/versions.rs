//! `evo versions` and `evo buckets`: what the store holds.

use evo_store::{parse_archive_version, ObjectStore, StoredObject};

use super::{open_store, report_error, CommandError};
use crate::config::{env_lookup, Settings};

/// Archives in `bucket` that carry a version, sorted by version.
pub fn versioned_archives(store: &dyn ObjectStore, bucket: &str) -> Result<Vec<(u32, StoredObject)>, CommandError> {
    let mut archives: Vec<(u32, StoredObject)> = store
        .list(bucket)?
        .into_iter()
        .filter_map(|o| parse_archive_version(&o.name).map(|v| (v, o)))
        .collect();
    archives.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));
    Ok(archives)
}

pub fn cmd_versions(settings: &Settings, json: bool) -> i32 {
    let store = match open_store(settings, env_lookup) {
        Ok(store) => store,
        Err(e) => return report_error(&e.into(), json),
    };
    let bucket = &settings.storage.staging_bucket;
    let archives = match versioned_archives(store.as_ref(), bucket) {
        Ok(archives) => archives,
        Err(e) => return report_error(&e, json),
    };

    if json {
        let items: Vec<_> = archives
            .iter()
            .map(|(version, object)| {
                serde_json::json!({
                    "version": version,
                    "name": object.name,
                    "size": object.size,
                    "updated_at": object.updated_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
    } else if archives.is_empty() {
        println!("No versions stored in {}", bucket);
    } else {
        println!("Versions in {}:", bucket);
        for (version, object) in &archives {
            match object.size {
                Some(size) => println!("  V{:<4} {} ({} bytes)", version, object.name, size),
                None => println!("  V{:<4} {}", version, object.name),
            }
        }
    }
    0
}

pub fn cmd_buckets(settings: &Settings, json: bool) -> i32 {
    let store = match open_store(settings, env_lookup) {
        Ok(store) => store,
        Err(e) => return report_error(&e.into(), json),
    };
    match store.list_buckets() {
        Ok(buckets) => {
            if json {
                println!("{}", serde_json::json!({ "backend": store.name(), "buckets": buckets }));
            } else {
                println!("Available buckets ({}): {}", store.name(), buckets.join(", "));
            }
            0
        }
        Err(e) => report_error(&CommandError::from(e), json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evo_store::{LocalStore, ZIP_CONTENT_TYPE};

    #[test]
    fn test_versioned_archives_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        for name in ["V10_p.zip", "V2_p.zip", "notes.txt"] {
            store.upload("packs", name, b"x", ZIP_CONTENT_TYPE).unwrap();
        }
        let versions: Vec<u32> = versioned_archives(&store, "packs")
            .unwrap()
            .into_iter()
            .map(|(v, _)| v)
            .collect();
        assert_eq!(versions, vec![2, 10]);
        assert!(versioned_archives(&store, "missing").unwrap().is_empty());
    }
}
