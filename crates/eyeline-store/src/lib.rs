//! eyeline-store: eye positions per photo, kept in SQLite.
//!
//! At most one record may exist per file name; anything else is reported as
//! corruption and never repaired automatically.

pub mod consistency;
pub mod store;

pub use consistency::{check_source_count, find_orphans, is_confirmed, tidy, TidyReport, CONFIRM_WORD};
pub use store::{PhotoStore, StoreError};
