use crate::models::{Activity, ProductId, ProductPair, UserId};
use std::collections::{BTreeSet, HashMap};

/// Pairwise product co-occurrence over one activity window.
///
/// For every pair of distinct products touched by the same user the counter
/// for the unordered pair is incremented once per user. Pairs must co-occur
/// more than `min_count - 1` times to be retained, and each retained pair's
/// strength is `count / max(retained_pair_count, 1)`.
///
/// The denominator is the number of distinct retained pairs, not total
/// interaction volume, so a pair's strength shifts when other pairs cross
/// the threshold. Strengths are comparable within one run only.
pub fn build(activities: &[Activity], min_count: u64) -> HashMap<ProductPair, f64> {
    let mut per_user: HashMap<UserId, BTreeSet<ProductId>> = HashMap::new();
    for activity in activities {
        if let Some(product_id) = &activity.product_id {
            per_user
                .entry(activity.user_id.clone())
                .or_default()
                .insert(product_id.clone());
        }
    }

    let mut counts: HashMap<ProductPair, u64> = HashMap::new();
    for products in per_user.values() {
        let products: Vec<&ProductId> = products.iter().collect();
        for i in 0..products.len() {
            for j in (i + 1)..products.len() {
                let pair = ProductPair::new(products[i].clone(), products[j].clone());
                *counts.entry(pair).or_insert(0) += 1;
            }
        }
    }

    counts.retain(|_, count| *count >= min_count);

    let retained = counts.len().max(1) as f64;
    counts
        .into_iter()
        .map(|(pair, count)| (pair, count as f64 / retained))
        .collect()
}
