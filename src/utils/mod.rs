use chrono::{DateTime, Duration, Utc};

pub mod metrics;
pub mod validation;

/// Start of a trailing window of `days` ending now.
pub fn window_start(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// Sort `(id, score)` candidates by score descending, ties by id ascending
/// for a stable ordering, and keep the top `k`.
pub fn top_k_scored(mut scored: Vec<(String, f64)>, k: usize) -> Vec<(String, f64)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

/// Sort candidates by primary score descending, then secondary count
/// descending, then id ascending, and keep the top `k`.
pub fn top_k_scored_with_tiebreak(
    mut scored: Vec<(String, f64, u64)>,
    k: usize,
) -> Vec<(String, f64, u64)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}
