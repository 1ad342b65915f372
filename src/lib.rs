pub mod algorithms;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::EngineError;
pub use models::*;

use anyhow::Result;
use services::bus::{EventDispatcher, InMemoryBus, MessageBus};
use services::cache::RecommendationCache;
use services::recommendation::RecommendationService;
use services::registry::ModelRegistry;
use services::store::{ActivityStore, InMemoryActivityStore};
use services::training::TrainingService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ActivityStore>,
    pub bus: Arc<dyn MessageBus>,
    pub registry: Arc<ModelRegistry>,
    pub recommendation_service: Arc<RecommendationService>,
    pub cache: Arc<RecommendationCache>,
    pub training_service: Arc<TrainingService>,
    pub dispatcher: Arc<EventDispatcher>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let store: Arc<dyn ActivityStore> = Arc::new(InMemoryActivityStore::new());
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(config.bus.capacity));
        let registry = Arc::new(ModelRegistry::new(config.clone()));

        let recommendation_service = Arc::new(RecommendationService::new(
            store.clone(),
            registry.clone(),
            bus.clone(),
            config.clone(),
        ));

        let cache = Arc::new(RecommendationCache::new(
            recommendation_service.clone(),
            &config,
        ));

        let training_service = TrainingService::new(
            store.clone(),
            registry.clone(),
            bus.clone(),
            config.clone(),
        );

        let dispatcher = Arc::new(EventDispatcher::new(bus.clone()));
        register_cache_invalidation(&dispatcher, cache.clone()).await;

        Ok(Self {
            config,
            store,
            bus,
            registry,
            recommendation_service,
            cache,
            training_service,
            dispatcher,
        })
    }

    /// Spawns the event dispatch loop and the periodic retrain timer.
    pub fn start_background(&self) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.run().await;
        });
        self.training_service.spawn_periodic();
    }
}

/// New activity for a user drops that user's cached recommendations; a
/// generation event drops only entries older than the event so the batch the
/// generating call just cached survives. Model updates do not touch the
/// cache.
async fn register_cache_invalidation(dispatcher: &EventDispatcher, cache: Arc<RecommendationCache>) {
    for event_type in [
        EventType::UserViewedProduct,
        EventType::UserAddedToCart,
        EventType::UserPurchasedProduct,
        EventType::UserSearchedProducts,
    ] {
        let cache = cache.clone();
        dispatcher
            .register(event_type, move |envelope| {
                let cache = cache.clone();
                Box::pin(async move {
                    cache.invalidate_user(&envelope.aggregate_id);
                    Ok(())
                })
            })
            .await;
    }

    dispatcher
        .register(EventType::RecommendationGenerated, move |envelope| {
            let cache = cache.clone();
            Box::pin(async move {
                cache.invalidate_user_before(&envelope.aggregate_id, envelope.timestamp);
                Ok(())
            })
        })
        .await;
}

pub async fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
