//! eventlog ingestion pipeline.
//!
//! This crate turns normalized events into durable storage and counts.
//!
//! # Modules
//!
//! - [`pipeline`] - Append-log writer and count index backends
//! - [`coordinator`] - [`Ingestor`], which runs a submission through both
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Submission    │  (event name + query fields from the HTTP layer)
//! └────────┬────────┘
//!          │ normalize
//!          ▼
//! ┌─────────────────┐
//! │    Ingestor     │  rejects unknown types before any side effect
//! └───┬─────────┬───┘
//!     │         │
//!     ▼         ▼
//! ┌───────────┐ ┌────────────┐
//! │ AppendLog │ │ CountIndex │  best-effort, failures only logged
//! └───────────┘ └────────────┘
//! ```

pub mod coordinator;
pub mod pipeline;

// Re-export the shared error type so callers need only one import path
pub use eventlog_core::{Error, Result};

pub use coordinator::{Accepted, CountQuery, EventCounts, Ingestor};
pub use pipeline::{
    AppendLog, AppendLogConfig, AppendLogStats, CountIndex, MemoryCountIndex, ScoreRange,
    SqliteCountIndex, StorageFault, WriterHealth,
};
