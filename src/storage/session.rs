//! Session storage.
//!
//! Redis key pattern: `session:{token}`: session data (JSON).
//!
//! ## Security: Zeroizing Sensitive Data
//!
//! Session JSON read back from Redis is wrapped in `Zeroizing` so the copy
//! holding the token is cleared once deserialized. Redis keeps its own copy;
//! this only covers the application's memory.

use crate::models::StoredSession;
use crate::storage::{SessionStore, StoreError};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

/// Store a session in Redis with TTL.
pub async fn store_session<C>(
    con: &mut C,
    session: &StoredSession,
    ttl_secs: u64,
) -> Result<(), StoreError>
where
    C: AsyncCommands,
{
    let json = Zeroizing::new(serde_json::to_string(session)?);
    con.set_ex::<_, _, ()>(session_key(&session.token), json.as_str(), ttl_secs)
        .await?;
    Ok(())
}

/// Get a session by token.
///
/// The session JSON is zeroized after deserialization.
pub async fn get_session<C>(con: &mut C, token: &str) -> Result<Option<StoredSession>, StoreError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(session_key(token)).await?;

    match json {
        Some(data) => {
            let zeroizing_data = Zeroizing::new(data);
            let session = serde_json::from_str(&zeroizing_data)?;
            Ok(Some(session))
        }
        None => Ok(None),
    }
}

/// Delete a session from Redis.
///
/// Returns true if the session was deleted, false if it didn't exist.
pub async fn delete_session<C>(con: &mut C, token: &str) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let deleted: i32 = con.del(session_key(token)).await?;
    Ok(deleted > 0)
}

/// Redis-backed [`SessionStore`].
#[derive(Clone)]
pub struct RedisSessionStore {
    client: redis::Client,
}

impl RedisSessionStore {
    pub fn new(client: redis::Client) -> Self {
        RedisSessionStore { client }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn store(&self, session: &StoredSession, ttl_secs: u64) -> Result<(), StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        store_session(&mut con, session, ttl_secs).await
    }

    async fn get(&self, token: &str, now: u64) -> Result<Option<StoredSession>, StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        Ok(get_session(&mut con, token)
            .await?
            .filter(|session| !session.is_expired(now)))
    }

    async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        delete_session(&mut con, token).await
    }
}

/// Process-local [`SessionStore`] used when Redis is not configured.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every session that expired at or before `now`.
    pub async fn purge_expired(&self, now: u64) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        before - sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn store(&self, session: &StoredSession, _ttl_secs: u64) -> Result<(), StoreError> {
        self.sessions
            .lock()
            .await
            .insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, token: &str, now: u64) -> Result<Option<StoredSession>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(token)
            .filter(|session| !session.is_expired(now))
            .cloned())
    }

    async fn delete(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.lock().await.remove(token).is_some())
    }
}
