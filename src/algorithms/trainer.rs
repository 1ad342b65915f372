use crate::models::{
    Model, ProductId, ProductPair, ProductProfile, ProductVector, TrainingRunConfig, UserId,
    UserProfile, UserVector,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-global sequence folded into every version so back-to-back runs in
/// the same millisecond still produce strictly increasing identifiers.
static VERSION_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn next_version() -> String {
    let seq = VERSION_SEQ.fetch_add(1, Ordering::SeqCst);
    format!("v{}-{}", Utc::now().timestamp_millis(), seq)
}

/// Combines extractor and similarity output into a new immutable model.
/// The previously served model is never touched; the registry swaps whole
/// values.
pub fn build_model(
    user_vectors: &HashMap<UserId, UserVector>,
    product_vectors: &HashMap<ProductId, ProductVector>,
    similarity: HashMap<ProductPair, f64>,
    config: &TrainingRunConfig,
    min_interactions: usize,
    top_categories: usize,
) -> Model {
    let user_profiles = user_vectors
        .iter()
        .map(|(user_id, vector)| (user_id.clone(), build_user_profile(vector, top_categories)))
        .collect();

    let product_profiles = product_vectors
        .iter()
        .map(|(product_id, vector)| (product_id.clone(), build_product_profile(vector)))
        .collect();

    Model {
        version: next_version(),
        user_profiles,
        product_profiles,
        similarity,
        weights: config.weights.clone(),
        time_decay: config.time_decay,
        min_interactions,
        trained_at: Utc::now(),
    }
}

fn build_user_profile(vector: &UserVector, top_categories: usize) -> UserProfile {
    let views = vector.viewed.len() as u64;
    let carts = vector.carted.len() as u64;
    let purchases = vector.purchased.len() as u64;

    UserProfile {
        view_count: views,
        purchase_count: purchases,
        cart_count: carts,
        preferred_categories: vector.top_categories(top_categories),
        avg_price_range: vector.avg_viewed_price(),
        last_activity: vector.last_activity.unwrap_or_else(Utc::now),
        engagement_score: 5.0 * purchases as f64 + 2.0 * carts as f64 + views as f64,
    }
}

fn build_product_profile(vector: &ProductVector) -> ProductProfile {
    let conversion_rate = if vector.view_count == 0 {
        0.0
    } else {
        vector.purchase_count as f64 / vector.view_count as f64
    };

    ProductProfile {
        category: vector.category.clone().unwrap_or_default(),
        price: vector.price,
        popularity_score: vector.view_count as f64
            + 2.0 * vector.cart_count as f64
            + 5.0 * vector.purchase_count as f64,
        conversion_rate,
        unique_users: vector.unique_users.len() as u64,
    }
}
