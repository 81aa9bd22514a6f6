//! Transfer module for moving media between the remote server and local disk.
//!
//! The `Transfer` trait covers the raw operations. `TransferStage` layers
//! bounded retries (transient errors only) and throttled progress events
//! on top for the pipeline workers.

mod config;
mod error;
mod fs_transfer;
mod retry;
mod stage;
mod traits;
mod types;

pub use config::TransferConfig;
pub use error::TransferError;
pub use fs_transfer::{resolve_remote, FsTransfer};
pub use retry::{run_with_retry, RetryDecision, RetryFailure, RetryPolicy};
pub use stage::TransferStage;
pub use traits::Transfer;
pub use types::TransferProgress;
