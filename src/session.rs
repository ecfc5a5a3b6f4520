use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::{self, HistoryEntry};
use crate::metrics;
use crate::store::{SessionStore, StoreError};

/// A per-visitor simulator session.
///
/// Sessions are anonymous: the random id is the only credential, acting as
/// a bearer capability for appending to the history, so it must stay
/// unguessable (UUID v4). `history` holds the JSON-encoded execution log as
/// stored; use the history codec to interpret it.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub origin_address: String,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub history: Option<String>,
    /// Store-internal write guard, bumped by every save. Not part of the
    /// API representation.
    #[serde(skip)]
    pub(crate) version: i64,
}

/// Resolve the address a session should be attributed to.
///
/// The first entry of a comma-separated forwarded-for header wins over the
/// direct peer address (reverse-proxy convention; later entries are
/// intermediaries).
pub fn client_address(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> String {
    if let Some(header) = forwarded_for {
        if let Some(first) = header.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Orchestrates session creation and history appends on top of the store
/// and the history codec.
pub struct SessionManager {
    store: Arc<SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Create a new session attributed to `origin_address`.
    ///
    /// This is the only operation that assigns a session id.
    pub fn start_session(&self, origin_address: &str) -> Result<Session, StoreError> {
        let session = self.store.create(origin_address)?;
        metrics::record_session_created();
        if let Ok(active) = self.store.count() {
            metrics::set_active_sessions(active);
        }
        Ok(session)
    }

    /// Append one executed-code entry to a session's history and return
    /// the new total entry count.
    ///
    /// Read-modify-write over the session row: decode the stored history
    /// (unreadable history is discarded, not fatal), push a timestamped
    /// entry, re-encode and save. A version conflict means another append
    /// landed in between; the whole cycle is retried so neither entry is
    /// lost. `NotFound` propagates with no side effect.
    pub fn append_code(&self, id: &str, code: Option<String>) -> Result<usize, StoreError> {
        loop {
            let mut session = self.store.get(id)?;
            let mut entries = history::decode(session.history.as_deref());
            entries.push(HistoryEntry {
                timestamp: Utc::now(),
                code: code.clone(),
            });

            session.history = Some(history::encode(&entries)?);
            session.last_touched_at = Utc::now();

            match self.store.save(&mut session) {
                Ok(()) => {
                    metrics::record_code_append();
                    return Ok(entries.len());
                }
                Err(StoreError::Conflict) => {
                    metrics::record_append_conflict();
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_entry_wins() {
        let addr = client_address(Some("1.2.3.4, 5.6.7.8"), peer("9.9.9.9:1234"));
        assert_eq!(addr, "1.2.3.4");
    }

    #[test]
    fn test_single_forwarded_for_entry() {
        let addr = client_address(Some("1.2.3.4"), peer("9.9.9.9:1234"));
        assert_eq!(addr, "1.2.3.4");
    }

    #[test]
    fn test_peer_address_without_forwarded_for() {
        let addr = client_address(None, peer("9.9.9.9:1234"));
        assert_eq!(addr, "9.9.9.9");
    }

    #[test]
    fn test_blank_forwarded_for_falls_back_to_peer() {
        let addr = client_address(Some("   "), peer("9.9.9.9:1234"));
        assert_eq!(addr, "9.9.9.9");
    }

    #[test]
    fn test_no_address_at_all() {
        assert_eq!(client_address(None, None), "unknown");
    }
}
