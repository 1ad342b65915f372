use crate::algorithms::rank_with_model;
use crate::models::{Activity, ActivityKind, Model, ValidationReport};
use crate::utils::metrics::MetricsCalculator;
use tracing::{info, warn};

/// Holdout evaluation of a candidate model.
///
/// Rows are sorted by user then time and the holdout slice is the first 20%
/// of that sorted sequence, so the split leans on user id order rather than
/// a clean time cut. Every held-out purchase with a product id is tested: a
/// hit means the purchased product appears in the model's top-k ranking for
/// that user.
pub fn evaluate(
    model: &Model,
    activities: &[Activity],
    k: usize,
    precision_threshold: f64,
) -> ValidationReport {
    let mut rows: Vec<&Activity> = activities.iter().collect();
    rows.sort_by(|a, b| {
        a.user_id
            .cmp(&b.user_id)
            .then_with(|| a.occurred_at.cmp(&b.occurred_at))
    });

    let holdout_len = rows.len() / 5;
    let holdout = &rows[..holdout_len];

    let metrics = MetricsCalculator::new(k);
    let mut hits = 0usize;
    let mut tested = 0usize;
    for row in holdout {
        if row.kind != ActivityKind::Purchase {
            continue;
        }
        let Some(product_id) = &row.product_id else {
            continue;
        };

        tested += 1;
        let ranked: Vec<String> = rank_with_model(model, &row.user_id, k)
            .into_iter()
            .map(|(product, _)| product)
            .collect();
        if metrics.hit_at_k(&ranked, product_id) {
            hits += 1;
        }
    }

    let precision = if tested == 0 { 0.0 } else { hits as f64 / tested as f64 };
    let products = model.product_profiles.len();
    let coverage = if products + tested == 0 {
        0.0
    } else {
        products as f64 / (products + tested) as f64
    };
    let accepted = precision > precision_threshold;

    if accepted {
        info!(
            version = %model.version,
            precision,
            coverage,
            "candidate model accepted"
        );
    } else {
        // reported but does not block publication
        warn!(
            version = %model.version,
            precision,
            threshold = precision_threshold,
            "candidate model below precision threshold"
        );
    }

    ValidationReport { precision, coverage, hits, tested, accepted }
}
