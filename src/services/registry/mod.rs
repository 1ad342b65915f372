use crate::config::Config;
use crate::error::EngineError;
use crate::models::{Model, ModelPush};
use crate::utils::validation::validate_model;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Holds the currently served model behind a whole-value swap.
///
/// Readers take an `Arc<Model>` snapshot; a publish replaces the Arc in one
/// step, so an in-flight request keeps serving with the model it captured
/// and never observes a partially-updated one.
pub struct ModelRegistry {
    current: RwLock<Option<Arc<Model>>>,
    config: Arc<Config>,
}

impl ModelRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self { current: RwLock::new(None), config }
    }

    pub fn current(&self) -> Option<Arc<Model>> {
        self.current.read().clone()
    }

    /// Current model, lazily installing a default one (fixed config weights,
    /// empty profiles) for the cold path.
    pub fn current_or_default(&self) -> Arc<Model> {
        if let Some(model) = self.current() {
            return model;
        }

        let mut slot = self.current.write();
        // another task may have installed one while we waited for the lock
        if let Some(model) = slot.as_ref() {
            return model.clone();
        }

        let default = Arc::new(self.default_model());
        info!(version = %default.version, "initialized default model");
        *slot = Some(default.clone());
        default
    }

    fn default_model(&self) -> Model {
        Model {
            version: crate::algorithms::trainer::next_version(),
            user_profiles: HashMap::new(),
            product_profiles: HashMap::new(),
            similarity: HashMap::new(),
            weights: self.config.training.run_config().weights,
            time_decay: self.config.training.time_decay,
            min_interactions: self.config.recommendation.min_interactions,
            trained_at: Utc::now(),
        }
    }

    /// Atomically swaps in a validated candidate. A malformed candidate is
    /// rejected and the previous model stays untouched. Re-publishing the
    /// already-current version is an idempotent no-op.
    pub fn publish(&self, candidate: Model) -> Result<(), EngineError> {
        validate_model(&candidate)?;

        let mut slot = self.current.write();
        if let Some(current) = slot.as_ref() {
            if current.version == candidate.version {
                info!(version = %candidate.version, "re-published current model version, no-op");
                return Ok(());
            }
        }

        info!(version = %candidate.version, "model hot-swapped");
        *slot = Some(Arc::new(candidate));
        Ok(())
    }

    /// Cross-service publication path. The push payload carries the
    /// hyperparameters only; the same publish contract applies.
    pub fn publish_push(&self, push: ModelPush) -> Result<(), EngineError> {
        let candidate = Model {
            version: push.version,
            user_profiles: HashMap::new(),
            product_profiles: HashMap::new(),
            similarity: HashMap::new(),
            weights: push.weights,
            time_decay: push.time_decay,
            min_interactions: push.min_interactions,
            trained_at: Utc::now(),
        };
        self.publish(candidate)
    }
}
