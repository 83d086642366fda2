//! Core types, normalization and shared utilities for the eventlog pipeline.
//!
//! This crate provides:
//! - The registered event types ([`EventRegistry`])
//! - Query-field collapsing and timestamp normalization ([`normalize`])
//! - A clock abstraction for deterministic tests
//! - Prometheus metrics helpers
//! - Shared error types

pub mod clock;
mod error;
mod event;
pub mod metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use event::{
    ALLOWED_PAST_SECS, EventRecord, EventRegistry, EventType, FieldValue, NANOS_PER_SEC,
    RawFields, TIMESTAMP_FIELD, clamp_timestamp, collapse_query_pairs, normalize,
};
