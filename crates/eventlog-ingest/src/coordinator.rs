//! Ingestion coordinator.
//!
//! [`Ingestor`] drives one submission through the pipeline:
//!
//! ```text
//! Received ─▶ Normalized ─▶ Enqueued ─▶ Counted ─▶ Acknowledged
//!     │
//!     └──▶ Rejected (unknown event type, no side effects)
//! ```
//!
//! The append-log enqueue decides the outcome. The count index update runs
//! afterwards in the caller's task and its failures are only logged.

use crate::pipeline::{AppendLog, CountIndex, ScoreRange, WriterHealth};
use eventlog_core::metrics::{COUNT_INDEX_FAILURES, INGEST_ACCEPTED, INGEST_REJECTED, increment};
use eventlog_core::{Clock, Error, EventRegistry, RawFields, Result, normalize};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Acknowledgement for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    /// Registered event name.
    pub event: String,
    /// Receipt time in nanoseconds.
    pub received_at_nanos: i64,
    /// Clamped logical timestamp in seconds.
    pub timestamp_secs: i64,
}

/// A validated count query.
///
/// `0` on either side means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountQuery {
    since: i64,
    until: i64,
}

impl CountQuery {
    /// Validate query bounds.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidQueryRange`] if either bound is negative, or both are
    /// set and `until < since`.
    pub fn new(since: i64, until: i64) -> Result<Self> {
        if since < 0 || until < 0 || (since != 0 && until != 0 && until < since) {
            return Err(Error::InvalidQueryRange { since, until });
        }
        Ok(Self { since, until })
    }

    /// Lower bound (0 = unbounded).
    pub fn since(&self) -> i64 {
        self.since
    }

    /// Upper bound (0 = unbounded).
    pub fn until(&self) -> i64 {
        self.until
    }

    /// Whether both sides are unbounded.
    pub fn is_unbounded(&self) -> bool {
        self.since == 0 && self.until == 0
    }

    fn range(&self) -> ScoreRange {
        ScoreRange::from_sentinels(self.since, self.until)
    }
}

/// Per-type counts for a [`CountQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCounts {
    /// The query that produced these counts.
    pub query: CountQuery,
    /// Event name to count, for every registered type.
    pub counts: BTreeMap<String, u64>,
}

/// Glues normalization, the append log and the count index together.
#[derive(Clone)]
pub struct Ingestor {
    registry: EventRegistry,
    writer: Arc<AppendLog>,
    index: Arc<dyn CountIndex>,
    clock: Arc<dyn Clock>,
}

impl Ingestor {
    /// Create a coordinator over already-started components.
    pub fn new(
        registry: EventRegistry,
        writer: Arc<AppendLog>,
        index: Arc<dyn CountIndex>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            writer,
            index,
            clock,
        }
    }

    /// Registered event types.
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Health of the underlying writer.
    pub fn writer_health(&self) -> WriterHealth {
        self.writer.health()
    }

    /// Accept one submission.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownEventType`] before any side effect
    /// - [`Error::StorageFatal`] / [`Error::WriterStopped`] if the writer
    ///   cannot take the record
    ///
    /// Count index failures never surface here.
    pub fn submit(&self, event_name: &str, fields: RawFields) -> Result<Accepted> {
        let record = match normalize(event_name, fields, &self.registry, self.clock.now()) {
            Ok(record) => record,
            Err(e) => {
                debug!(event = event_name, error = %e, "rejected submission");
                increment(INGEST_REJECTED, 1);
                return Err(e);
            }
        };
        debug!(record = %record, "normalized");

        let accepted = Accepted {
            event: record.name().to_string(),
            received_at_nanos: record.received_at_nanos(),
            timestamp_secs: record.timestamp_secs(),
        };
        let score = record.received_at_secs();

        if let Err(e) = self.writer.enqueue(record) {
            error!(event = %accepted.event, error = %e, "could not enqueue record");
            increment(INGEST_REJECTED, 1);
            return Err(e);
        }
        increment(INGEST_ACCEPTED, 1);

        if let Err(e) = self.index.record_arrival(&accepted.event, score) {
            error!(
                event = %accepted.event,
                backend = self.index.name(),
                error = %e,
                "count index update failed, skipping stats"
            );
            increment(COUNT_INDEX_FAILURES, 1);
        }

        Ok(accepted)
    }

    /// Count arrivals of every registered type.
    ///
    /// Bounds are validated before the index is touched. A failing lookup for
    /// one type is logged and reported as `0` for that type.
    pub fn counts(&self, since: i64, until: i64) -> Result<EventCounts> {
        let query = CountQuery::new(since, until)?;

        let counts = self
            .registry
            .iter()
            .map(|event_type| {
                let name = event_type.name();
                let result = if query.is_unbounded() {
                    self.index.count_total(name)
                } else {
                    self.index.count_range(name, query.range())
                };
                let count = result.unwrap_or_else(|e| {
                    error!(
                        event = name,
                        since = query.since,
                        until = query.until,
                        error = %e,
                        "count query failed"
                    );
                    increment(COUNT_INDEX_FAILURES, 1);
                    0
                });
                (name.to_string(), count)
            })
            .collect();

        Ok(EventCounts { query, counts })
    }
}
