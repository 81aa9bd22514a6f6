//! Server-side backups of originals, upload finalization and restore.

mod manager;
mod naming;
mod types;

pub use manager::BackupManager;
pub use naming::{backup_path_for, encoded_path_for, staging_path_for};
pub use types::{FinalizedUpload, RestoreError, RestoreOutcome, RestoreSource};
