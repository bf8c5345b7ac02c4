//! Content-addressed dedup cache for extraction results.
//!
//! Keyed by a hash of the normalized posting text, so reposted or duplicated
//! postings (and documents redone after a crash) never hit the model twice.
//! The cache is an optimisation: read or write failures are logged and treated
//! as a miss, never as a run failure.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::llm_client::MODEL;
use crate::models::SkillMention;

/// Bump when the extraction prompt or reply validation changes meaning.
const CACHE_VERSION: &str = "v1";
const REDIS_KEY_PREFIX: &str = "taxonomy:extraction:";

/// Hex SHA-256 of the whitespace-normalized document text, scoped to the model
/// and cache version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_text(text: &str) -> Self {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut hasher = Sha256::new();
        hasher.update(CACHE_VERSION.as_bytes());
        hasher.update([0u8]);
        hasher.update(MODEL.as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait ExtractionCache: Send + Sync {
    async fn get(&self, key: &ContentHash) -> Option<Vec<SkillMention>>;
    async fn put(&self, key: &ContentHash, mentions: &[SkillMention]);
}

/// In-process cache. Lives as long as the service; used when Redis is not configured.
#[derive(Default)]
pub struct MemoryExtractionCache {
    entries: RwLock<HashMap<ContentHash, Vec<SkillMention>>>,
}

impl MemoryExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ExtractionCache for MemoryExtractionCache {
    async fn get(&self, key: &ContentHash) -> Option<Vec<SkillMention>> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: &ContentHash, mentions: &[SkillMention]) {
        self.entries
            .write()
            .await
            .insert(key.clone(), mentions.to_vec());
    }
}

/// Redis-backed cache shared across service restarts and replicas.
pub struct RedisExtractionCache {
    client: redis::Client,
}

impl RedisExtractionCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn redis_key(key: &ContentHash) -> String {
        format!("{REDIS_KEY_PREFIX}{}", key.as_str())
    }
}

#[async_trait]
impl ExtractionCache for RedisExtractionCache {
    async fn get(&self, key: &ContentHash) -> Option<Vec<SkillMention>> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Extraction cache unavailable, treating as miss: {e}");
                return None;
            }
        };
        let raw: Option<String> = match conn.get(Self::redis_key(key)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Extraction cache read failed: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw?) {
            Ok(mentions) => Some(mentions),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {e}", key.as_str());
                None
            }
        }
    }

    async fn put(&self, key: &ContentHash, mentions: &[SkillMention]) {
        let payload = match serde_json::to_string(mentions) {
            Ok(p) => p,
            Err(e) => {
                warn!("Could not encode cache entry: {e}");
                return;
            }
        };
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Extraction cache unavailable, skipping write: {e}");
                return;
            }
        };
        let result: redis::RedisResult<()> = conn.set(Self::redis_key(key), payload).await;
        match result {
            Ok(()) => debug!("Cached {} mentions under {}", mentions.len(), key.as_str()),
            Err(e) => warn!("Extraction cache write failed: {e}"),
        }
    }
}
