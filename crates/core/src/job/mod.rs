//! Job records, the transition rules that govern them, and their storage.

mod rules;
mod sqlite_store;
mod store;
mod types;

pub use rules::apply_transition;
pub use sqlite_store::SqliteJobStore;
pub use store::{JobStore, StoreError};
pub use types::*;
