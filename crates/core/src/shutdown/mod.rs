//! Host shutdown once the queue has drained.

mod config;
mod host;
mod monitor;

pub use config::ShutdownConfig;
pub use host::{CommandShutdown, HostShutdown, ShutdownError};
pub use monitor::{MonitorState, ShutdownMonitor};
