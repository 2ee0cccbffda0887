//! Caching middleware (spec §4.4): LRU keyed by the node content hash, or a
//! hash of `options.prompt`+`options.model` when there's no node context.
//!
//! Grounded on the teacher's `cache::InMemoryCache` (`cache/in_memory.rs`).
//! The key hash reuses `sha2`, the same crate `tree::hash` hashes nodes with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::adapter::{AdapterOptions, AdapterResult};
use crate::cache::{Cache, InMemoryCache};
use crate::middleware::{DoExecute, Middleware};

/// `options.extra["content_hash"]` is the key a calling engine threads
/// through from the node being executed; absent it, the middleware falls
/// back to hashing the prompt and model.
const CONTENT_HASH_FIELD: &str = "content_hash";

pub struct CachingMiddleware {
    cache: Arc<InMemoryCache<String, AdapterResult>>,
    ttl: Option<Duration>,
}

impl CachingMiddleware {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            cache: Arc::new(InMemoryCache::with_capacity(capacity)),
            ttl,
        }
    }

    fn key_for(options: &AdapterOptions) -> String {
        if let Some(hash) = options.extra.get(CONTENT_HASH_FIELD).and_then(|v| v.as_str()) {
            return hash.to_string();
        }
        let mut hasher = Sha256::new();
        hasher.update(options.prompt.as_bytes());
        hasher.update([0u8]);
        hasher.update(options.model.as_deref().unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl Middleware for CachingMiddleware {
    fn name(&self) -> Option<&str> {
        Some("caching")
    }

    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        let key = Self::key_for(&options);
        if let Some(cached) = self.cache.get(&key).await {
            return cached;
        }
        let result = do_execute(options).await;
        let _ = self.cache.set(key, result.clone(), self.ttl).await;
        result
    }
}
