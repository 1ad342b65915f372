use crate::config::Config;
use crate::error::EngineError;
use crate::models::{RecommendationResponse, UserId};
use crate::services::recommendation::RecommendationService;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheEntry {
    response: RecommendationResponse,
    inserted_at: DateTime<Utc>,
}

/// Per-instance memoization of generated recommendations, keyed by
/// `(user_id, limit)` with a fixed TTL. Entries are never mutated after
/// insertion, only replaced wholesale. Invalidation is event-driven per
/// user; model updates intentionally do not clear the cache, so a staleness
/// window exists between a hot-swap and TTL expiry (accepted trade-off of
/// the event wiring).
pub struct RecommendationCache {
    entries: DashMap<(UserId, usize), CacheEntry>,
    ttl: Duration,
    recommender: Arc<RecommendationService>,
}

impl RecommendationCache {
    pub fn new(recommender: Arc<RecommendationService>, config: &Config) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::seconds(config.cache.ttl_seconds),
            recommender,
        }
    }

    pub async fn get_or_generate(
        &self,
        user_id: &str,
        limit: usize,
        force_refresh: bool,
    ) -> Result<RecommendationResponse, EngineError> {
        let key = (user_id.to_string(), limit);

        if !force_refresh {
            if let Some(entry) = self.entries.get(&key) {
                if Utc::now() - entry.inserted_at < self.ttl {
                    debug!(user = user_id, limit, "cache hit");
                    return Ok(entry.response.clone());
                }
            }
        }

        let response = self.recommender.generate(user_id, limit).await?;
        self.entries.insert(
            key,
            CacheEntry { response: response.clone(), inserted_at: Utc::now() },
        );
        Ok(response)
    }

    /// Drops every entry for the user regardless of limit. Wired to the
    /// activity event types.
    pub fn invalidate_user(&self, user_id: &str) {
        self.entries.retain(|(user, _), _| user != user_id);
        info!(user = user_id, "invalidated cached recommendations");
    }

    /// Drops the user's entries inserted before `cutoff`. Used by the
    /// generation-event handler so the batch just cached by the generating
    /// call survives while older entries for other limits go.
    pub fn invalidate_user_before(&self, user_id: &str, cutoff: DateTime<Utc>) {
        self.entries
            .retain(|(user, _), entry| user != user_id || entry.inserted_at >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
