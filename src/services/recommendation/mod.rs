use crate::config::Config;
use crate::error::EngineError;
use crate::models::*;
use crate::services::bus::MessageBus;
use crate::services::registry::ModelRegistry;
use crate::services::store::ActivityStore;
use crate::utils::{top_k_scored, top_k_scored_with_tiebreak, window_start};
use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Produces ranked product candidates for a user with the registry's current
/// model: a collaborative path over similar users' interactions, falling
/// back to a 7-day popularity ranking for cold-start users.
pub struct RecommendationService {
    store: Arc<dyn ActivityStore>,
    registry: Arc<ModelRegistry>,
    bus: Arc<dyn MessageBus>,
    config: Arc<Config>,
    /// Latest generated batch per user; replaced wholesale on each write.
    latest_batches: DashMap<UserId, RecommendationResponse>,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        registry: Arc<ModelRegistry>,
        bus: Arc<dyn MessageBus>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            registry,
            bus,
            config,
            latest_batches: DashMap::new(),
        }
    }

    pub async fn generate(&self, user_id: &str, limit: usize) -> Result<RecommendationResponse, EngineError> {
        let model = self.registry.current_or_default();

        let recent = self
            .store
            .recent_for_user(user_id, self.config.recommendation.recent_events_limit)
            .await
            .map_err(|e| EngineError::data_unavailable(e.to_string()))?;

        let recommendations = if recent.len() < model.min_interactions {
            info!(user = user_id, events = recent.len(), "cold start, popularity fallback");
            self.popularity_ranking(limit).await?
        } else {
            let collaborative = self.collaborative_ranking(user_id, &recent, limit).await?;
            if collaborative.is_empty() {
                info!(user = user_id, "no similar users, popularity fallback");
                self.popularity_ranking(limit).await?
            } else {
                collaborative
            }
        };

        let response = RecommendationResponse {
            user_id: user_id.to_string(),
            recommendations,
            model_version: model.version.clone(),
            generated_at: Utc::now(),
        };

        // previous batch for this user is discarded on write
        self.latest_batches.insert(user_id.to_string(), response.clone());
        self.emit_generated(&response).await;

        Ok(response)
    }

    /// Ranks with an explicit model's own profiles instead of the served
    /// one; the validator drives this path with each candidate model.
    pub fn generate_with_model(&self, model: &Model, user_id: &str, limit: usize) -> Vec<Recommendation> {
        crate::algorithms::rank_with_model(model, user_id, limit)
            .into_iter()
            .map(|(product_id, score)| Recommendation {
                product_id,
                score,
                confidence: score.min(1.0),
                reason: REASON_COLLABORATIVE.to_string(),
            })
            .collect()
    }

    pub fn latest_batch(&self, user_id: &str) -> Option<RecommendationResponse> {
        self.latest_batches.get(user_id).map(|r| r.clone())
    }

    /// Popularity fallback: `views + 2*carts + 5*purchases` over a trailing
    /// 7-day window, fixed confidence 0.5.
    async fn popularity_ranking(&self, limit: usize) -> Result<Vec<Recommendation>, EngineError> {
        let cutoff = window_start(self.config.recommendation.popularity_window_days);
        let window = self
            .store
            .since(cutoff)
            .await
            .map_err(|e| EngineError::data_unavailable(e.to_string()))?;

        let mut scores: HashMap<ProductId, f64> = HashMap::new();
        for activity in &window {
            let Some(product_id) = &activity.product_id else { continue };
            let weight = match activity.kind {
                ActivityKind::View => 1.0,
                ActivityKind::AddToCart => 2.0,
                ActivityKind::Purchase => 5.0,
                ActivityKind::Search => continue,
            };
            *scores.entry(product_id.clone()).or_insert(0.0) += weight;
        }

        Ok(top_k_scored(scores.into_iter().collect(), limit)
            .into_iter()
            .map(|(product_id, score)| Recommendation {
                product_id,
                score,
                confidence: 0.5,
                reason: REASON_POPULAR.to_string(),
            })
            .collect())
    }

    /// Collaborative path: users sharing >= 2 products with the target in
    /// the 30-day window (pool capped at 50) vote on products the target has
    /// not touched, ranked by mean weighted activity score with raw
    /// frequency as the tie-break.
    async fn collaborative_ranking(
        &self,
        user_id: &str,
        recent: &[Activity],
        limit: usize,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let cutoff = window_start(self.config.recommendation.similar_window_days);
        let window = self
            .store
            .since(cutoff)
            .await
            .map_err(|e| EngineError::data_unavailable(e.to_string()))?;

        let touched: HashSet<&ProductId> =
            recent.iter().filter_map(|a| a.product_id.as_ref()).collect();

        let mut products_by_user: HashMap<&str, HashSet<&ProductId>> = HashMap::new();
        for activity in &window {
            if activity.user_id == user_id {
                continue;
            }
            if let Some(product_id) = &activity.product_id {
                products_by_user
                    .entry(activity.user_id.as_str())
                    .or_default()
                    .insert(product_id);
            }
        }

        let mut similar: Vec<(&str, usize)> = products_by_user
            .iter()
            .filter_map(|(other, products)| {
                let shared = products.iter().filter(|p| touched.contains(**p)).count();
                (shared >= self.config.recommendation.min_shared_products)
                    .then_some((*other, shared))
            })
            .collect();
        similar.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        similar.truncate(self.config.recommendation.similar_user_cap);

        if similar.is_empty() {
            return Ok(Vec::new());
        }

        let similar_users: HashSet<&str> = similar.iter().map(|(u, _)| *u).collect();
        let mut score_sum: HashMap<&ProductId, f64> = HashMap::new();
        let mut frequency: HashMap<&ProductId, u64> = HashMap::new();
        for activity in &window {
            if !similar_users.contains(activity.user_id.as_str()) {
                continue;
            }
            let Some(product_id) = &activity.product_id else { continue };
            if touched.contains(product_id) {
                continue;
            }
            let weight = match activity.kind {
                ActivityKind::Purchase => 5.0,
                ActivityKind::AddToCart => 3.0,
                ActivityKind::View => 1.0,
                ActivityKind::Search => continue,
            };
            *score_sum.entry(product_id).or_insert(0.0) += weight;
            *frequency.entry(product_id).or_insert(0) += 1;
        }

        let candidates: Vec<(String, f64, u64)> = score_sum
            .into_iter()
            .map(|(product_id, sum)| {
                let freq = frequency[product_id];
                (product_id.clone(), sum / freq as f64, freq)
            })
            .collect();

        let similar_count = similar_users.len() as f64;
        Ok(top_k_scored_with_tiebreak(candidates, limit)
            .into_iter()
            .map(|(product_id, score, freq)| Recommendation {
                product_id,
                score,
                confidence: (freq as f64 / similar_count).min(1.0),
                reason: REASON_COLLABORATIVE.to_string(),
            })
            .collect())
    }

    /// Bus publication is not atomic with the batch write; a failed publish
    /// leaves downstream caches stale until TTL expiry.
    async fn emit_generated(&self, response: &RecommendationResponse) {
        let envelope = EventEnvelope::new(
            EventType::RecommendationGenerated,
            response.user_id.clone(),
            json!({
                "user_id": response.user_id,
                "count": response.recommendations.len(),
                "model_version": response.model_version,
            }),
        );
        if let Err(e) = self.bus.publish(envelope).await {
            warn!(user = %response.user_id, "failed to publish recommendation event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bus::InMemoryBus;
    use crate::services::store::InMemoryActivityStore;
    use chrono::Duration;
    use serde_json::json;

    fn service(store: Arc<InMemoryActivityStore>) -> RecommendationService {
        let config = Arc::new(Config::default());
        RecommendationService::new(
            store,
            Arc::new(ModelRegistry::new(config.clone())),
            Arc::new(InMemoryBus::new(64)),
            config,
        )
    }

    async fn seed(store: &InMemoryActivityStore, user: &str, product: &str, kind: ActivityKind) {
        store
            .append(
                Activity::new(user, Some(product.to_string()), kind)
                    .with_payload(json!({"category": "books", "price": 15.0}))
                    .with_occurred_at(Utc::now() - Duration::hours(1)),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cold_start_user_gets_popularity_fallback() {
        let store = Arc::new(InMemoryActivityStore::new());
        seed(&store, "user-1", "p1", ActivityKind::View).await;
        seed(&store, "user-1", "p2", ActivityKind::View).await;
        // other users make p3 popular
        for i in 0..3 {
            seed(&store, &format!("u{i}"), "p3", ActivityKind::Purchase).await;
        }

        let service = service(store);
        let response = service.generate("user-1", 5).await.unwrap();
        assert!(!response.recommendations.is_empty());
        assert!(response
            .recommendations
            .iter()
            .all(|r| r.reason == REASON_POPULAR && r.confidence == 0.5));
        assert_eq!(response.recommendations[0].product_id, "p3");
    }

    #[tokio::test]
    async fn collaborative_path_excludes_touched_products() {
        let store = Arc::new(InMemoryActivityStore::new());
        // target user: 3 interactions
        seed(&store, "user-1", "p1", ActivityKind::View).await;
        seed(&store, "user-1", "p2", ActivityKind::View).await;
        seed(&store, "user-1", "p3", ActivityKind::View).await;
        // similar user shares p1 and p2, also purchased p9
        seed(&store, "user-2", "p1", ActivityKind::View).await;
        seed(&store, "user-2", "p2", ActivityKind::View).await;
        seed(&store, "user-2", "p9", ActivityKind::Purchase).await;

        let service = service(store);
        let response = service.generate("user-1", 5).await.unwrap();
        assert_eq!(response.recommendations.len(), 1);
        let top = &response.recommendations[0];
        assert_eq!(top.product_id, "p9");
        assert_eq!(top.reason, REASON_COLLABORATIVE);
        assert!((top.score - 5.0).abs() < 1e-9);
        assert!((top.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_similar_users_falls_back_to_popularity() {
        let store = Arc::new(InMemoryActivityStore::new());
        for p in ["p1", "p2", "p3"] {
            seed(&store, "user-1", p, ActivityKind::View).await;
        }
        // another user exists but shares only one product
        seed(&store, "user-2", "p1", ActivityKind::View).await;
        seed(&store, "user-2", "p8", ActivityKind::View).await;

        let service = service(store);
        let response = service.generate("user-1", 5).await.unwrap();
        assert!(response
            .recommendations
            .iter()
            .all(|r| r.reason == REASON_POPULAR));
    }

    #[tokio::test]
    async fn explicit_model_ranks_with_its_own_profiles() {
        let service = service(Arc::new(InMemoryActivityStore::new()));

        let mut product_profiles = HashMap::new();
        for (id, popularity) in [("cold", 1.0), ("hot", 9.0)] {
            product_profiles.insert(
                id.to_string(),
                ProductProfile {
                    category: "books".to_string(),
                    price: 15.0,
                    popularity_score: popularity,
                    conversion_rate: 0.0,
                    unique_users: 2,
                },
            );
        }
        let model = Model {
            version: "candidate-v1".to_string(),
            user_profiles: HashMap::new(),
            product_profiles,
            similarity: HashMap::new(),
            weights: TrainingRunConfig::default().weights,
            time_decay: 0.9,
            min_interactions: 3,
            trained_at: Utc::now(),
        };

        let ranked = service.generate_with_model(&model, "nobody", 2);
        assert_eq!(ranked[0].product_id, "hot");
        assert!(ranked.iter().all(|r| r.reason == REASON_COLLABORATIVE));
    }

    #[tokio::test]
    async fn latest_batch_replaced_on_write() {
        let store = Arc::new(InMemoryActivityStore::new());
        seed(&store, "user-1", "p1", ActivityKind::View).await;

        let service = service(store);
        let first = service.generate("user-1", 5).await.unwrap();
        let second = service.generate("user-1", 5).await.unwrap();
        let latest = service.latest_batch("user-1").unwrap();
        assert_eq!(latest.generated_at, second.generated_at);
        assert!(latest.generated_at >= first.generated_at);
    }
}
