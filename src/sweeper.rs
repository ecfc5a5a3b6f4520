use std::sync::Arc;

use tracing::{info, warn};

use crate::metrics;
use crate::store::{SessionStore, StoreError};

/// Run one retention pass: delete every session older than `threshold` and
/// return the number deleted.
pub fn sweep_once(
    store: &SessionStore,
    threshold: chrono::Duration,
) -> Result<usize, StoreError> {
    let deleted = store.delete_older_than(threshold)?;
    if deleted > 0 {
        metrics::record_sessions_reaped(deleted);
    }
    if let Ok(active) = store.count() {
        metrics::set_active_sessions(active);
    }
    info!(deleted, "retention sweep finished");
    Ok(deleted)
}

/// Fixed-interval retention loop.
///
/// A failed pass is logged and retried on the next tick; it never
/// propagates to client-facing operations.
pub async fn run(store: Arc<SessionStore>, every: std::time::Duration, threshold: chrono::Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; skip it so the initial sweep
    // happens one full interval after startup.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(err) = sweep_once(&store, threshold) {
            metrics::record_sweep_failure();
            warn!(%err, "retention sweep failed, retrying on the next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_with_no_expired_sessions_deletes_nothing() {
        let store = SessionStore::in_memory().unwrap();
        store.create("1.2.3.4").unwrap();

        assert_eq!(sweep_once(&store, chrono::Duration::days(10)).unwrap(), 0);
        // Idempotent: a second pass with no new expirations is also a no-op
        assert_eq!(sweep_once(&store, chrono::Duration::days(10)).unwrap(), 0);
        assert_eq!(store.count().unwrap(), 1);
    }
}
