//! Background purge of expired in-memory nonces and sessions.
//!
//! Redis expires keys on its own. The in-memory stores used without Redis
//! only hide expired entries on lookup, so this job periodically drops them
//! to keep abandoned sign-in attempts from accumulating.

use crate::storage::{unix_now, MemoryNonceStore, MemorySessionStore};
use std::sync::Arc;
use std::time::Duration;

/// Run the purge loop.
///
/// Sweeps the stores every `interval`. Never returns; spawn it.
///
/// `nonces` is None when nonces live only in cookies.
pub async fn run_purge_loop(
    nonces: Option<Arc<MemoryNonceStore>>,
    sessions: Arc<MemorySessionStore>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        purge_expired(nonces.as_deref(), &sessions, unix_now()).await;
    }
}

/// Drop every entry expired at `now`, returning `(nonces, sessions)` removed.
pub async fn purge_expired(
    nonces: Option<&MemoryNonceStore>,
    sessions: &MemorySessionStore,
    now: u64,
) -> (usize, usize) {
    let purged_nonces = match nonces {
        Some(store) => store.purge_expired(now).await,
        None => 0,
    };
    let purged_sessions = sessions.purge_expired(now).await;

    if purged_nonces > 0 || purged_sessions > 0 {
        tracing::info!(
            nonces = purged_nonces,
            sessions = purged_sessions,
            "Purge job completed"
        );
    }

    (purged_nonces, purged_sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StoredNonce, StoredSession};
    use crate::storage::{NonceStore, SessionStore};

    #[tokio::test]
    async fn test_purge_drops_only_expired() {
        let nonces = MemoryNonceStore::new();
        let sessions = MemorySessionStore::new();

        for (nonce, expires_at) in [("old1", 100), ("old2", 150), ("live", 900)] {
            nonces
                .insert(
                    &StoredNonce {
                        nonce: nonce.to_string(),
                        issued_at: 0,
                        expires_at,
                    },
                    600,
                )
                .await
                .unwrap();
        }
        sessions
            .store(
                &StoredSession {
                    token: "expired".to_string(),
                    address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
                    chain_id: 1,
                    created_at: 0,
                    expires_at: 200,
                },
                200,
            )
            .await
            .unwrap();

        assert_eq!(purge_expired(Some(&nonces), &sessions, 200).await, (2, 1));
        assert_eq!(nonces.len().await, 1);
        assert!(nonces.get("live", 200).await.unwrap().is_some());

        // Second sweep has nothing left to do
        assert_eq!(purge_expired(Some(&nonces), &sessions, 200).await, (0, 0));
        assert_eq!(purge_expired(None, &sessions, 200).await, (0, 0));
    }
}
