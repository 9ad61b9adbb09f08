//! Local persistence: SQLite job records, the wizard snapshot and keychain credentials.

pub mod credentials;
pub mod dashboard;
pub mod database;
pub mod records;
pub mod snapshot;

pub use dashboard::DashboardMetrics;
pub use database::Database;
pub use records::{JobRecord, JobRecordStore, LocalRecordStore, RecordStatus};
pub use snapshot::{FileSnapshotStore, SnapshotStore};
