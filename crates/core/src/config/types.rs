use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use super::PipelineSettings;
use crate::encoder::EncoderConfig;
use crate::scheduler::SchedulerConfig;
use crate::shutdown::ShutdownConfig;
use crate::transfer::TransferConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Initial live settings; the API can change them afterwards.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("recast.db")
}

/// Where media lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Local mount point of the remote media server.
    pub remote_root: PathBuf,
    /// Scratch space for downloaded and encoded files, one directory per job.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

/// Config view for API responses (shutdown command hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub encoder: EncoderConfig,
    pub transfer: TransferConfig,
    pub scheduler: SchedulerConfig,
    pub shutdown: SanitizedShutdownConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedShutdownConfig {
    pub grace_period_secs: u64,
    pub poll_interval_ms: u64,
    pub command_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            encoder: config.encoder.clone(),
            transfer: config.transfer.clone(),
            scheduler: config.scheduler.clone(),
            shutdown: SanitizedShutdownConfig {
                grace_period_secs: config.shutdown.grace_period_secs,
                poll_interval_ms: config.shutdown.poll_interval_ms,
                command_configured: !config.shutdown.command.is_empty(),
            },
        }
    }
}
