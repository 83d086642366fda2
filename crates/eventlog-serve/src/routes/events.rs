//! Event submission endpoint.

use axum::extract::{Path, Query, State};
use eventlog_core::{Error, collapse_query_pairs};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /v1/{event}?k=v&...`
///
/// Query parameters become the event's fields; `ts` is the client-side
/// timestamp in seconds. Responds with a plain `Accepted` once the record is
/// queued for the append log.
pub async fn submit(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<&'static str, ApiError> {
    let event_name = event_name(&path)?;
    state
        .ingestor
        .submit(event_name, collapse_query_pairs(pairs))?;
    Ok("Accepted")
}

/// `GET /v1/` with no event name.
pub async fn missing_event() -> ApiError {
    Error::MalformedSubmission("missing event name".to_string()).into()
}

/// The event name is exactly one path segment after `/v1/`.
fn event_name(path: &str) -> Result<&str, Error> {
    if path.is_empty() || path.contains('/') {
        return Err(Error::MalformedSubmission(format!(
            "expected /v1/<event>, got /v1/{path}"
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_single_segment() {
        assert_eq!(event_name("link_clicked").unwrap(), "link_clicked");
    }

    #[test]
    fn test_event_name_rejects_nested_and_empty() {
        assert!(matches!(
            event_name("a/b"),
            Err(Error::MalformedSubmission(_))
        ));
        assert!(matches!(event_name(""), Err(Error::MalformedSubmission(_))));
        assert!(event_name("session_start/").is_err());
    }
}
