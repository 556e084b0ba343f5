//! Reconciling the store with the photo directory.

use crate::store::{PhotoStore, Result, StoreError};
use std::collections::HashSet;
use std::path::Path;

/// Answer the operator must type to confirm a tidy.
pub const CONFIRM_WORD: &str = "delete";

/// Outcome of a tidy run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TidyReport {
    /// Records in the store before tidying.
    pub before: usize,
    /// Stored file names missing from the photo directory, in capture order.
    pub orphans: Vec<String>,
    pub deleted: usize,
    pub confirmed: bool,
}

/// Refuse to add photos when the source directory holds fewer photos than the store has records.
pub fn check_source_count(store: &PhotoStore, photos: usize) -> Result<()> {
    let records = store.count()?;
    if photos < records {
        tracing::warn!(photos, records, "fewer photos in source directory than records in store");
        return Err(StoreError::SourceShrunk { photos, records });
    }
    Ok(())
}

/// File names stored in `store` that no longer exist in `photo_dir`.
pub fn find_orphans(store: &PhotoStore, photo_dir: &Path) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut orphans = Vec::new();
    for record in store.all_ordered()? {
        if photo_dir.join(&record.filename).exists() {
            tracing::trace!(file = %record.filename, "found on disk");
        } else if seen.insert(record.filename.clone()) {
            tracing::debug!(file = %record.filename, "missing on disk");
            orphans.push(record.filename);
        }
    }
    Ok(orphans)
}

/// Whether a typed answer confirms deletion. Only the exact word counts.
pub fn is_confirmed(answer: &str) -> bool {
    answer.trim_end_matches(['\n', '\r']) == CONFIRM_WORD
}

/// Remove orphaned records after `confirm` approves the list.
///
/// `confirm` is only consulted when there is something to delete. Each
/// deletion commits on its own.
pub fn tidy<F>(store: &mut PhotoStore, photo_dir: &Path, confirm: F) -> Result<TidyReport>
where
    F: FnOnce(&[String]) -> std::io::Result<bool>,
{
    let before = store.count()?;
    let orphans = find_orphans(store, photo_dir)?;
    let mut report = TidyReport {
        before,
        orphans,
        ..TidyReport::default()
    };

    if report.orphans.is_empty() {
        return Ok(report);
    }

    report.confirmed = confirm(&report.orphans)?;
    if !report.confirmed {
        tracing::info!(orphans = report.orphans.len(), "deletion aborted");
        return Ok(report);
    }

    for name in &report.orphans {
        report.deleted += store.delete(name)?;
    }
    tracing::info!(deleted = report.deleted, "removed orphaned records");
    Ok(report)
}
