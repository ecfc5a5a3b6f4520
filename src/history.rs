use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed-code record in a session's history log.
///
/// `code` mirrors exactly what the client submitted: it may be an empty
/// string, or absent entirely (stored as JSON `null`). The text is never
/// executed server-side, so no validation is applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub code: Option<String>,
}

/// Decode a stored history column into an ordered entry sequence.
///
/// A missing or empty column is an empty log. A column that no longer
/// parses as an entry array is discarded: the anomaly is logged and
/// counted, and the caller gets a fresh empty log. Unreadable prior
/// history must never block a new entry from being recorded.
pub fn decode(raw: Option<&str>) -> Vec<HistoryEntry> {
    let raw = match raw {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Vec::new(),
    };

    match serde_json::from_str::<Vec<HistoryEntry>>(raw) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(%err, "stored code history is unreadable, starting a fresh log");
            crate::metrics::record_history_recovery();
            Vec::new()
        }
    }
}

/// Encode an entry sequence into the canonical stored form.
///
/// Round-trips with `decode` for any sequence this system constructs.
pub fn encode(entries: &[HistoryEntry]) -> serde_json::Result<String> {
    serde_json::to_string(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now(),
            code: Some(code.to_string()),
        }
    }

    #[test]
    fn test_round_trip() {
        let entries = vec![entry("LDA 5"), entry("ADD 3")];
        let encoded = encode(&entries).unwrap();
        assert_eq!(decode(Some(&encoded)), entries);
    }

    #[test]
    fn test_round_trip_preserves_null_and_empty_code() {
        let entries = vec![
            HistoryEntry {
                timestamp: Utc::now(),
                code: None,
            },
            entry(""),
        ];
        let encoded = encode(&entries).unwrap();
        let decoded = decode(Some(&encoded));
        assert_eq!(decoded, entries);
        assert_eq!(decoded[0].code, None);
        assert_eq!(decoded[1].code, Some(String::new()));
    }

    #[test]
    fn test_missing_column_is_empty_log() {
        assert!(decode(None).is_empty());
        assert!(decode(Some("")).is_empty());
        assert!(decode(Some("   ")).is_empty());
    }

    #[test]
    fn test_garbage_is_discarded_without_error() {
        assert!(decode(Some("not json at all")).is_empty());
        assert!(decode(Some("{\"truncated\": [")).is_empty());
    }

    #[test]
    fn test_wrong_shape_is_discarded() {
        // Valid JSON, but not an entry array
        assert!(decode(Some("{\"timestamp\": 1, \"code\": \"LDA 5\"}")).is_empty());
        assert!(decode(Some("[{\"no_timestamp\": true}]")).is_empty());
        assert!(decode(Some("42")).is_empty());
    }

    #[test]
    fn test_empty_array_round_trips() {
        let encoded = encode(&[]).unwrap();
        assert_eq!(encoded, "[]");
        assert!(decode(Some(&encoded)).is_empty());
    }
}
