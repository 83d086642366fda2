//! Count statistics endpoint.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

const INVALID_RANGE: &str = "Invalid since or until parameters";

/// Raw query parameters; parsed leniently so bad input becomes a range error
/// rather than an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub since: Option<String>,
    pub until: Option<String>,
}

/// Response for `GET /stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /stats?since=&until=`
///
/// Counts per registered event type, by receipt time in seconds. Either bound
/// may be omitted. Bad bounds are reported in the `error` field with a 200.
pub async fn counts(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<StatsResponse> {
    let since = int_param(query.since.as_deref());
    let until = int_param(query.until.as_deref());

    let response = match state.ingestor.counts(since, until) {
        Ok(counts) => {
            let bounded = !counts.query.is_unbounded();
            StatsResponse {
                since: bounded.then_some(since),
                until: bounded.then_some(until),
                stats: Some(counts.counts),
                error: None,
            }
        }
        Err(e) => {
            tracing::debug!(since, until, error = %e, "rejected stats query");
            StatsResponse {
                error: Some(INVALID_RANGE.to_string()),
                ..Default::default()
            }
        }
    };

    Json(response)
}

/// Missing or empty is 0 (unbounded); anything unparseable is -1 (invalid).
fn int_param(value: Option<&str>) -> i64 {
    match value {
        None | Some("") => 0,
        Some(v) => v.parse().unwrap_or(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_param() {
        assert_eq!(int_param(None), 0);
        assert_eq!(int_param(Some("")), 0);
        assert_eq!(int_param(Some("150")), 150);
        assert_eq!(int_param(Some("abc")), -1);
        assert_eq!(int_param(Some("1.5")), -1);
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let response = StatsResponse {
            stats: Some(BTreeMap::from([("a".to_string(), 2)])),
            ..Default::default()
        };
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"stats":{"a":2}}"#);
    }
}
