use crate::error::EngineError;
use crate::models::{Activity, ActivityKind, Model};

/// Shape check applied before any candidate model is published. A failing
/// candidate is rejected and the previously served model stays in place.
pub fn validate_model(model: &Model) -> Result<(), EngineError> {
    if model.version.trim().is_empty() {
        return Err(EngineError::validation("model version must be a non-empty identifier"));
    }

    for kind in [ActivityKind::View, ActivityKind::AddToCart, ActivityKind::Purchase] {
        match model.weights.get(&kind) {
            Some(w) if w.is_finite() => {}
            Some(_) => {
                return Err(EngineError::validation(format!(
                    "model weight for {kind} is not finite"
                )))
            }
            None => {
                return Err(EngineError::validation(format!(
                    "model weights missing entry for {kind}"
                )))
            }
        }
    }

    if !model.time_decay.is_finite() {
        return Err(EngineError::validation("model time_decay is not finite"));
    }

    Ok(())
}

pub fn validate_activity(activity: &Activity) -> Result<(), EngineError> {
    if activity.user_id.trim().is_empty() {
        return Err(EngineError::validation("activity user_id cannot be empty"));
    }

    if let Some(product_id) = &activity.product_id {
        if product_id.trim().is_empty() {
            return Err(EngineError::validation("activity product_id cannot be empty"));
        }
    }

    let now = chrono::Utc::now();
    if activity.occurred_at > now + chrono::Duration::hours(1) {
        return Err(EngineError::validation(
            "activity timestamp cannot be more than 1 hour in the future",
        ));
    }

    Ok(())
}
