//! Event types, submitted payloads and timestamp normalization.
//!
//! A submission arrives as an event name plus a flat set of query fields.
//! [`normalize`] checks the name against the [`EventRegistry`], pulls the
//! logical timestamp out of the `ts` field, clamps it into the trailing
//! 24-hour window and stamps the receipt time. The result is an immutable
//! [`EventRecord`] ready for the append log and the count index.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Name of the payload field carrying the logical event time.
pub const TIMESTAMP_FIELD: &str = "ts";

/// How far in the past a logical timestamp may lie before it is replaced
/// with the current time.
pub const ALLOWED_PAST_SECS: i64 = 86_400;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════
// Event types
// ═══════════════════════════════════════════════════════════════════════════

/// A registered category of event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventType {
    name: String,
}

impl EventType {
    /// The unique event name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The immutable set of event types accepted by this process.
///
/// Built once at startup and shared by cloning (the list is behind an `Arc`).
#[derive(Debug, Clone)]
pub struct EventRegistry {
    types: Arc<[EventType]>,
}

impl EventRegistry {
    /// Build a registry from a list of names.
    ///
    /// Names end up in file paths, so they must be non-empty, unique and free
    /// of path separators, NUL bytes and `.`/`..`.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut types: Vec<EventType> = Vec::new();
        for name in names {
            let name = name.into();
            validate_type_name(&name)?;
            if types.iter().any(|t| t.name == name) {
                return Err(Error::Config(format!("duplicate event type: {name}")));
            }
            types.push(EventType { name });
        }

        if types.is_empty() {
            return Err(Error::Config(
                "at least one event type must be registered".to_string(),
            ));
        }

        Ok(Self {
            types: types.into(),
        })
    }

    /// Look up a type by exact (case-sensitive) name.
    pub fn get(&self, name: &str) -> Option<&EventType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EventType> {
        self.types.iter()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn validate_type_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Config("event type name must not be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(Error::Config(format!(
            "event type name {name:?} is not usable as a file name"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Payload
// ═══════════════════════════════════════════════════════════════════════════

/// One payload value: a single string, or every value of a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A key that appeared once.
    One(String),
    /// A key that appeared several times, in submission order.
    Many(Vec<String>),
}

impl FieldValue {
    /// The value to use when only one is wanted: the single value, or the
    /// last of several.
    pub fn last(&self) -> Option<&str> {
        match self {
            Self::One(v) => Some(v),
            Self::Many(vs) => vs.last().map(String::as_str),
        }
    }
}

/// Submitted fields after multi-value collapsing, keyed deterministically.
pub type RawFields = BTreeMap<String, FieldValue>;

/// Collapse repeated query parameters into [`RawFields`].
///
/// - a key with exactly one value becomes [`FieldValue::One`]
/// - the timestamp key keeps only its last value
/// - any other repeated key becomes [`FieldValue::Many`], order preserved
pub fn collapse_query_pairs<I, K, V>(pairs: I) -> RawFields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in pairs {
        grouped.entry(k.into()).or_default().push(v.into());
    }

    grouped
        .into_iter()
        .filter_map(|(key, mut values)| {
            let value = if values.len() == 1 || key == TIMESTAMP_FIELD {
                FieldValue::One(values.pop()?)
            } else {
                FieldValue::Many(values)
            };
            Some((key, value))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════

/// A normalized, timestamped event ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    name: String,
    received_at_nanos: i64,
    timestamp_secs: i64,
    data: RawFields,
}

impl EventRecord {
    /// Registered event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock receipt time in nanoseconds since the Unix epoch.
    pub fn received_at_nanos(&self) -> i64 {
        self.received_at_nanos
    }

    /// Receipt time truncated to whole seconds.
    pub fn received_at_secs(&self) -> i64 {
        self.received_at_nanos.div_euclid(NANOS_PER_SEC)
    }

    /// Clamped logical event time in seconds.
    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp_secs
    }

    /// Caller payload, without the timestamp field.
    pub fn data(&self) -> &RawFields {
        &self.data
    }

    /// Deterministic JSON encoding of the payload.
    ///
    /// Keys are sorted and the clamped timestamp appears once, as an integer
    /// under `ts`. The raw submitted `ts` string is not kept.
    pub fn payload_json(&self) -> Result<String> {
        let payload = Payload {
            data: &self.data,
            ts: self.timestamp_secs,
        };
        Ok(serde_json::to_string(&payload)?)
    }
}

impl std::fmt::Display for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} @ {}] ts={} fields={}",
            self.name,
            self.received_at_nanos,
            self.timestamp_secs,
            self.data.len()
        )
    }
}

/// Serialization view merging the timestamp into the sorted payload map.
struct Payload<'a> {
    data: &'a RawFields,
    ts: i64,
}

impl Serialize for Payload<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.data.len() + 1))?;
        let mut ts_written = false;
        for (key, value) in self.data {
            if !ts_written && key.as_str() > TIMESTAMP_FIELD {
                map.serialize_entry(TIMESTAMP_FIELD, &self.ts)?;
                ts_written = true;
            }
            map.serialize_entry(key, value)?;
        }
        if !ts_written {
            map.serialize_entry(TIMESTAMP_FIELD, &self.ts)?;
        }
        map.end()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════════════════════

/// Validate a submission and turn it into an [`EventRecord`].
///
/// `now` is sampled once by the caller; both the clamp decision and the
/// receipt timestamp derive from it.
///
/// # Errors
///
/// Returns [`Error::UnknownEventType`] when `name` is not registered. A bad
/// `ts` value is never an error: it is logged and treated as `0`, which the
/// clamp then replaces with the current second.
pub fn normalize(
    name: &str,
    mut fields: RawFields,
    registry: &EventRegistry,
    now: DateTime<Utc>,
) -> Result<EventRecord> {
    let event_type = registry
        .get(name)
        .ok_or_else(|| Error::UnknownEventType(name.to_string()))?;

    let current_secs = now.timestamp();
    let received_at_nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| current_secs.saturating_mul(NANOS_PER_SEC));

    let submitted = fields
        .remove(TIMESTAMP_FIELD)
        .map(|value| parse_timestamp(name, &value))
        .unwrap_or(0);

    Ok(EventRecord {
        name: event_type.name().to_string(),
        received_at_nanos,
        timestamp_secs: clamp_timestamp(submitted, current_secs),
        data: fields,
    })
}

/// Parse a submitted timestamp, accepting fractional seconds.
///
/// The fraction is truncated toward zero; anything unparseable becomes `0`.
fn parse_timestamp(event_name: &str, value: &FieldValue) -> i64 {
    let raw = value.last().unwrap_or_default();
    match raw.parse::<f64>() {
        // `as` saturates at the i64 bounds and maps NaN to 0
        Ok(secs) => secs.trunc() as i64,
        Err(e) => {
            warn!(event = event_name, ts = raw, error = %e, "invalid timestamp, will override");
            0
        }
    }
}

/// Force `ts` into `[current_secs - ALLOWED_PAST_SECS, current_secs]`.
///
/// Values outside the window are replaced by `current_secs` rather than
/// pinned to the nearest edge.
pub fn clamp_timestamp(ts: i64, current_secs: i64) -> i64 {
    if ts > current_secs || ts < current_secs.saturating_sub(ALLOWED_PAST_SECS) {
        current_secs
    } else {
        ts
    }
}
