pub mod features;
pub mod similarity;
pub mod trainer;
pub mod validator;

use crate::models::{Model, ProductId, ProductProfile, UserProfile};
use crate::utils::top_k_scored;

/// Content score of one product for one user profile.
///
/// +0.3 when the product's category is among the user's preferred
/// categories, +0.2 when the price sits within 50% of the user's average
/// price range (guarded against a zero range), up to +0.3 from popularity
/// (popularity_score / 100, capped), plus conversion_rate * 0.2. The sum is
/// unbounded but typically <= 1; no renormalization is applied.
pub fn score_product(user: &UserProfile, product: &ProductProfile) -> f64 {
    let mut score = 0.0;

    if user.preferred_categories.iter().any(|c| c == &product.category) {
        score += 0.3;
    }

    if user.avg_price_range > 0.0
        && (product.price - user.avg_price_range).abs() / user.avg_price_range < 0.5
    {
        score += 0.2;
    }

    score += (product.popularity_score / 100.0).min(0.3);
    score += product.conversion_rate * 0.2;

    score
}

/// Top-k product ranking under a specific model, independent of the served
/// one. Known users are scored against their profile; unknown users fall
/// back to popularity order. The validator measures precision@k over this
/// ranking with each candidate model.
pub fn rank_with_model(model: &Model, user_id: &str, k: usize) -> Vec<(ProductId, f64)> {
    let scored: Vec<(ProductId, f64)> = match model.user_profiles.get(user_id) {
        Some(user) => model
            .product_profiles
            .iter()
            .map(|(product_id, product)| (product_id.clone(), score_product(user, product)))
            .collect(),
        None => model
            .product_profiles
            .iter()
            .map(|(product_id, product)| (product_id.clone(), product.popularity_score))
            .collect(),
    };

    top_k_scored(scored, k)
}
