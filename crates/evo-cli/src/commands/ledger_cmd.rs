//! `evo ledger`: print the version ledger.

use evo_core::Ledger;

use super::{report_error, CommandError};
use crate::config::Settings;

pub fn cmd_ledger(settings: &Settings, json: bool) -> i32 {
    let ledger = match Ledger::load(&settings.ledger_path()) {
        Ok(ledger) => ledger,
        Err(e) => return report_error(&CommandError::from(e), json),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&ledger).unwrap_or_default());
        return 0;
    }

    if ledger.is_empty() {
        println!("Ledger is empty; the next run produces V1.");
        return 0;
    }
    for entry in ledger.entries() {
        println!(
            "V{:<4} {:>3}/100  {}  {}",
            entry.version,
            entry.score,
            &entry.hash[..entry.hash.len().min(12)],
            entry.time.to_rfc3339()
        );
    }
    println!("Next version: V{}", ledger.next_version());
    0
}
