//! Eventlog Serve - HTTP front end for event ingestion
//!
//! Accepts events as `GET /v1/{event}?k=v` submissions, hands them to the
//! [`eventlog_ingest::Ingestor`] and serves per-type counts from `/stats`.
//!
//! # Architecture
//!
//! - **Config / AppState**: CLI/env configuration and the shared ingestor
//! - **Routes**: Endpoint handlers
//! - **Supervisor**: Restarts or shuts down on append-log faults

mod error;
mod routes;
mod state;
pub mod supervisor;

pub use self::error::ApiError;
pub use self::routes::{app, router};
pub use self::state::{AppState, Config};
pub use self::supervisor::{FaultPolicy, SupervisorExit, supervise};
