//! Backup and restore pipelines
//!
//! Both pipelines run their steps strictly in sequence under the operation
//! lock. Once the container has been stopped, starting it again is attempted
//! exactly once on every path.

pub mod backup;
pub mod restore;

pub use backup::BackupReport;
pub use restore::{Confirmer, RestoreReport, RestoreRequest, RestoreSummary};
