//! Nonce storage.
//!
//! Redis key pattern: `nonce:{nonce}`: issued nonce record (JSON), expiring
//! with the nonce TTL.

use crate::models::StoredNonce;
use crate::storage::{NonceStore, StoreError};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::Mutex;

fn nonce_key(nonce: &str) -> String {
    format!("nonce:{}", nonce)
}

/// Store a nonce in Redis with TTL.
pub async fn store_nonce<C>(
    con: &mut C,
    record: &StoredNonce,
    ttl_secs: u64,
) -> Result<(), StoreError>
where
    C: AsyncCommands,
{
    let json = serde_json::to_string(record)?;
    con.set_ex::<_, _, ()>(nonce_key(&record.nonce), json, ttl_secs)
        .await?;
    Ok(())
}

/// Read a nonce without consuming it.
pub async fn get_nonce<C>(con: &mut C, nonce: &str) -> Result<Option<StoredNonce>, StoreError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(nonce_key(nonce)).await?;
    match json {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

/// Get and delete a nonce atomically (single-use).
///
/// Uses a Lua script so that two instances racing on the same nonce cannot
/// both observe it.
pub async fn take_nonce<C>(con: &mut C, nonce: &str) -> Result<Option<StoredNonce>, StoreError>
where
    C: AsyncCommands,
{
    let script = redis::Script::new(
        r"
        local val = redis.call('GET', KEYS[1])
        if val then
            redis.call('DEL', KEYS[1])
        end
        return val
        ",
    );

    let json: Option<String> = script.key(nonce_key(nonce)).invoke_async(con).await?;
    match json {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

/// Redis-backed [`NonceStore`] shared across server instances.
#[derive(Clone)]
pub struct RedisNonceStore {
    client: redis::Client,
}

impl RedisNonceStore {
    pub fn new(client: redis::Client) -> Self {
        RedisNonceStore { client }
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn insert(&self, record: &StoredNonce, ttl_secs: u64) -> Result<(), StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        store_nonce(&mut con, record, ttl_secs).await
    }

    async fn get(&self, nonce: &str, now: u64) -> Result<Option<StoredNonce>, StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        Ok(get_nonce(&mut con, nonce)
            .await?
            .filter(|record| !record.is_expired(now)))
    }

    async fn take(&self, nonce: &str, now: u64) -> Result<Option<StoredNonce>, StoreError> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        // Redis TTL already drops expired keys; the timestamp check covers clock skew
        Ok(take_nonce(&mut con, nonce)
            .await?
            .filter(|record| !record.is_expired(now)))
    }
}

/// Process-local [`NonceStore`].
///
/// `take` removes under a single lock, so consume-once holds within one
/// process only.
#[derive(Default)]
pub struct MemoryNonceStore {
    nonces: Mutex<HashMap<String, StoredNonce>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every nonce that expired at or before `now`.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_expired(&self, now: u64) -> usize {
        let mut nonces = self.nonces.lock().await;
        let before = nonces.len();
        nonces.retain(|_, record| !record.is_expired(now));
        before - nonces.len()
    }

    pub async fn len(&self) -> usize {
        self.nonces.lock().await.len()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn insert(&self, record: &StoredNonce, _ttl_secs: u64) -> Result<(), StoreError> {
        self.nonces
            .lock()
            .await
            .insert(record.nonce.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, nonce: &str, now: u64) -> Result<Option<StoredNonce>, StoreError> {
        let nonces = self.nonces.lock().await;
        Ok(nonces
            .get(nonce)
            .filter(|record| !record.is_expired(now))
            .cloned())
    }

    async fn take(&self, nonce: &str, now: u64) -> Result<Option<StoredNonce>, StoreError> {
        let mut nonces = self.nonces.lock().await;
        Ok(nonces
            .remove(nonce)
            .filter(|record| !record.is_expired(now)))
    }
}
