//! YAML-backed catalog records.
//!
//! Each record is one YAML mapping stored in its own file, named after a slug of the record's
//! `name` field. The [`RecordStore`] reads the whole directory at once and rewrites individual
//! records atomically. [`load_file`] reads records kept together in a single file.

mod lock;
mod record;
mod slug;
mod staleness;
mod store;

pub use lock::{CatalogLockGuard, acquire_catalog_lock};
pub use record::{DATE_FORMAT, Record};
pub use slug::slugify;
pub use staleness::{StaleEntry, Staleness, StalenessThresholds, staleness_report};
pub use store::{RecordStore, StoredRecord, load_file};
