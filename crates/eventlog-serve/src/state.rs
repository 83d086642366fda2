//! Application state and configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use eventlog_core::EventRegistry;
use eventlog_ingest::{Ingestor, WriterHealth};

use crate::supervisor::FaultPolicy;

/// Event ingestion server.
///
/// Every option can also be set through the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "eventlog-serve")]
#[command(about = "HTTP event ingestion server", long_about = None, version)]
pub struct Config {
    /// Directory partition files are written under. Must already exist.
    #[arg(long, env = "EVENTLOG_DATA_DIR", default_value = "/tmp")]
    pub data_dir: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "EVENTLOG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(
        long,
        env = "EVENTLOG_PORT",
        default_value_t = 8080,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub port: u16,

    /// Comma-separated list of accepted event types.
    #[arg(
        long,
        env = "EVENTLOG_EVENT_TYPES",
        value_delimiter = ',',
        default_value = "session_start,session_end,link_clicked"
    )]
    pub event_types: Vec<String>,

    /// SQLite database for persistent counts (in-memory when unset).
    #[arg(long, env = "EVENTLOG_INDEX_DB")]
    pub index_db: Option<PathBuf>,

    /// Port for the Prometheus metrics endpoint (0 = disabled).
    #[arg(long, env = "EVENTLOG_METRICS_PORT", default_value_t = 0)]
    pub metrics_port: u16,

    /// Seconds to wait for in-flight requests on shutdown.
    #[arg(long, env = "EVENTLOG_SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    /// Times the writer may be restarted after a storage fault before the
    /// server shuts down (0 = shut down on the first fault).
    #[arg(long, env = "EVENTLOG_MAX_WRITER_RESTARTS", default_value_t = 0)]
    pub max_writer_restarts: u32,

    /// Delay before restarting a failed writer, in milliseconds.
    #[arg(long, env = "EVENTLOG_RESTART_BACKOFF_MS", default_value_t = 1000)]
    pub restart_backoff_ms: u64,

    /// Write buffer size for partition files, in bytes.
    #[arg(long, env = "EVENTLOG_BUFFER_SIZE", default_value_t = 64 * 1024)]
    pub buffer_size: usize,
}

impl Config {
    /// Check the settings that clap cannot and build the event registry.
    pub fn validate(&self) -> anyhow::Result<EventRegistry> {
        let meta = std::fs::metadata(&self.data_dir)
            .with_context(|| format!("data dir {} is not accessible", self.data_dir.display()))?;
        if !meta.is_dir() {
            anyhow::bail!("data dir {} is not a directory", self.data_dir.display());
        }
        if self.buffer_size == 0 {
            anyhow::bail!("buffer size must be greater than zero");
        }

        let registry = EventRegistry::new(self.event_types.iter().map(|s| s.trim()))
            .context("invalid event types")?;

        tracing::info!(
            data_dir = %self.data_dir.display(),
            bind_addr = %self.bind_addr(),
            event_types = ?self.event_types,
            index_db = ?self.index_db,
            "configuration loaded"
        );

        Ok(registry)
    }

    /// Server bind address (e.g., "0.0.0.0:8080").
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        FaultPolicy {
            max_restarts: self.max_writer_restarts,
            backoff: Duration::from_millis(self.restart_backoff_ms),
        }
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion pipeline.
    pub ingestor: Ingestor,
}

impl AppState {
    pub fn new(ingestor: Ingestor) -> Self {
        Self { ingestor }
    }

    pub fn writer_health(&self) -> WriterHealth {
        self.ingestor.writer_health()
    }
}
