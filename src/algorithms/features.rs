use crate::models::{Activity, ActivityKind, ProductId, ProductVector, UserId, UserVector};
use std::collections::HashMap;

/// Feature extraction over one activity window.
///
/// Pure function of its input: routes each row by kind into the matching
/// set/counter, accumulates a running average of viewed prices, and counts
/// category frequencies in first-occurrence order. Rows without a product id
/// (searches) skip product-keyed aggregation but still advance the user's
/// last-activity timestamp.
pub fn extract(
    activities: &[Activity],
) -> (HashMap<UserId, UserVector>, HashMap<ProductId, ProductVector>) {
    let mut user_vectors: HashMap<UserId, UserVector> = HashMap::new();
    let mut product_vectors: HashMap<ProductId, ProductVector> = HashMap::new();

    for activity in activities {
        let user = user_vectors.entry(activity.user_id.clone()).or_default();

        if user
            .last_activity
            .map_or(true, |last| activity.occurred_at > last)
        {
            user.last_activity = Some(activity.occurred_at);
        }

        let Some(product_id) = activity.product_id.clone() else {
            // search rows carry no product; nothing else to aggregate
            continue;
        };

        if let Some(category) = activity.payload_category() {
            user.bump_category(category);
        }

        match activity.kind {
            ActivityKind::View => {
                user.viewed.insert(product_id.clone());
                if let Some(price) = activity.payload_price() {
                    user.price_sum += price;
                    user.priced_views += 1;
                }
            }
            ActivityKind::AddToCart => {
                user.carted.insert(product_id.clone());
            }
            ActivityKind::Purchase => {
                user.purchased.insert(product_id.clone());
            }
            ActivityKind::Search => {}
        }

        let product = product_vectors.entry(product_id).or_default();
        if product.category.is_none() {
            product.category = activity.payload_category().map(str::to_string);
        }
        if let Some(price) = activity.payload_price() {
            product.price = price;
        }
        match activity.kind {
            ActivityKind::View => product.view_count += 1,
            ActivityKind::AddToCart => product.cart_count += 1,
            ActivityKind::Purchase => product.purchase_count += 1,
            ActivityKind::Search => {}
        }
        product.unique_users.insert(activity.user_id.clone());
    }

    (user_vectors, product_vectors)
}
