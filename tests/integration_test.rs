use chrono::{Duration, Utc};
use recwise::models::*;
use recwise::services::bus::MessageBus;
use recwise::services::store::ActivityStore;
use recwise::{AppState, Config};
use serde_json::json;
use uuid::Uuid;

const CATEGORIES: [&str; 4] = ["books", "electronics", "clothing", "home"];

/// Five users, ten products, deterministic interaction history.
async fn seed_demo(state: &AppState) {
    for u in 1..=5usize {
        let user = format!("user-{u}");
        for p in 1..=10usize {
            let product = format!("product-{p}");
            let category = CATEGORIES[(p - 1) % CATEGORIES.len()];
            let price = 10.0 + 10.0 * p as f64;

            // every user views a rotating window of products
            if (p + u) % 2 == 0 || p <= 4 {
                append(state, &user, &product, ActivityKind::View, category, price, (u * 10 + p) as i64).await;
            }
            // heavier engagement for low-numbered products
            if p <= 3 {
                append(state, &user, &product, ActivityKind::AddToCart, category, price, (u * 5 + p) as i64).await;
            }
            if p <= 2 {
                append(state, &user, &product, ActivityKind::Purchase, category, price, (u * 3 + p) as i64).await;
            }
        }
    }
}

async fn append(
    state: &AppState,
    user: &str,
    product: &str,
    kind: ActivityKind,
    category: &str,
    price: f64,
    minutes_ago: i64,
) {
    state
        .store
        .append(
            Activity::new(user, Some(product.to_string()), kind)
                .with_payload(json!({"category": category, "price": price}))
                .with_occurred_at(Utc::now() - Duration::minutes(minutes_ago)),
        )
        .await
        .unwrap();
}

async fn wait_terminal(state: &AppState, id: Uuid) -> TrainingJob {
    for _ in 0..400 {
        if let Some(job) = state.training_service.job(id).await {
            if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
                return job;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("training job never finished");
}

#[tokio::test]
async fn end_to_end_training_and_recommendation_flow() {
    let state = AppState::new(Config::default()).await.unwrap();
    seed_demo(&state).await;

    let outcome = state
        .training_service
        .submit(state.config.training.run_config())
        .await;
    assert_eq!(outcome.status, SubmitStatus::Started);

    let job = wait_terminal(&state, outcome.id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let report = job.report.expect("completed job carries a validation report");
    assert!(report.precision.is_finite());
    assert!((0.0..=1.0).contains(&report.precision));

    let model = state.registry.current().expect("training published a model");
    assert_eq!(model.product_profiles.len(), 10);
    assert_eq!(model.user_profiles.len(), 5);

    // generated products all exist in the catalog
    let catalog = state.store.product_ids().await.unwrap();
    let response = state.cache.get_or_generate("user-1", 5, false).await.unwrap();
    assert!(!response.recommendations.is_empty());
    for rec in &response.recommendations {
        assert!(catalog.contains(&rec.product_id));
    }

    // invalidation forces regeneration, observable via generated_at
    state.cache.invalidate_user("user-1");
    let regenerated = state.cache.get_or_generate("user-1", 5, false).await.unwrap();
    assert!(regenerated.generated_at > response.generated_at);
}

#[tokio::test]
async fn submissions_while_running_are_queued_never_parallel() {
    let state = AppState::new(Config::default()).await.unwrap();
    seed_demo(&state).await;

    let first = state
        .training_service
        .submit(state.config.training.run_config())
        .await;
    let second = state
        .training_service
        .submit(state.config.training.run_config())
        .await;
    let third = state
        .training_service
        .submit(state.config.training.run_config())
        .await;

    assert_eq!(first.status, SubmitStatus::Started);
    assert_eq!(second.status, SubmitStatus::Queued);
    assert_eq!(third.status, SubmitStatus::Queued);

    for id in [first.id, second.id, third.id] {
        assert_eq!(wait_terminal(&state, id).await.status, JobStatus::Completed);
    }

    // each run produced its own model version; the last one is serving
    let jobs = state.training_service.jobs().await;
    assert_eq!(jobs.len(), 3);
    assert!(state.training_service.is_idle().await);
}

#[tokio::test]
async fn successive_models_have_unique_versions_and_monotonic_trained_at() {
    let state = AppState::new(Config::default()).await.unwrap();
    seed_demo(&state).await;

    let mut versions = Vec::new();
    let mut last_trained_at = None;
    for _ in 0..3 {
        let outcome = state
            .training_service
            .submit(state.config.training.run_config())
            .await;
        wait_terminal(&state, outcome.id).await;
        let model = state.registry.current().unwrap();
        assert!(!versions.contains(&model.version));
        versions.push(model.version.clone());
        if let Some(previous) = last_trained_at {
            assert!(model.trained_at >= previous);
        }
        last_trained_at = Some(model.trained_at);
    }
}

#[tokio::test]
async fn publish_with_missing_weights_is_rejected() {
    let state = AppState::new(Config::default()).await.unwrap();

    let valid = ModelPush {
        version: "remote-v1".to_string(),
        model_type: "collaborative_filtering".to_string(),
        weights: TrainingRunConfig::default().weights,
        time_decay: 0.9,
        min_interactions: 3,
    };
    state.registry.publish_push(valid).unwrap();

    let invalid = ModelPush {
        version: "remote-v2".to_string(),
        model_type: "collaborative_filtering".to_string(),
        weights: std::collections::HashMap::new(),
        time_decay: 0.9,
        min_interactions: 3,
    };
    let err = state.registry.publish_push(invalid).unwrap_err();
    assert!(matches!(err, recwise::EngineError::Validation(_)));
    assert_eq!(state.registry.current().unwrap().version, "remote-v1");
}

#[tokio::test]
async fn cache_hits_are_bit_identical_and_force_refresh_bypasses() {
    let state = AppState::new(Config::default()).await.unwrap();
    seed_demo(&state).await;

    let first = state.cache.get_or_generate("user-2", 10, false).await.unwrap();
    let second = state.cache.get_or_generate("user-2", 10, false).await.unwrap();
    assert_eq!(first, second);

    let refreshed = state.cache.get_or_generate("user-2", 10, true).await.unwrap();
    assert!(refreshed.generated_at > first.generated_at);
}

#[tokio::test]
async fn two_views_stay_below_min_interactions() {
    let state = AppState::new(Config::default()).await.unwrap();
    // background popularity signal from other users
    append(&state, "user-8", "product-1", ActivityKind::Purchase, "books", 20.0, 30).await;
    append(&state, "user-9", "product-2", ActivityKind::View, "books", 30.0, 30).await;
    // the target user has exactly two recorded views
    append(&state, "user-1", "product-1", ActivityKind::View, "books", 20.0, 10).await;
    append(&state, "user-1", "product-2", ActivityKind::View, "books", 30.0, 5).await;

    let response = state.cache.get_or_generate("user-1", 5, false).await.unwrap();
    assert!(!response.recommendations.is_empty());
    assert!(response
        .recommendations
        .iter()
        .all(|r| r.reason == REASON_POPULAR));
}

#[tokio::test]
async fn activity_event_invalidates_cached_user() {
    let state = AppState::new(Config::default()).await.unwrap();
    seed_demo(&state).await;

    let first = state.cache.get_or_generate("user-3", 5, false).await.unwrap();
    assert!(state.cache.len() > 0);

    // dispatch an activity event the way the running loop would
    let envelope = EventEnvelope::new(
        EventType::UserPurchasedProduct,
        "user-3",
        json!({"product_id": "product-1"}),
    );
    state.bus.publish(envelope.clone()).await.unwrap();
    state.dispatcher.dispatch(envelope).await;

    let regenerated = state.cache.get_or_generate("user-3", 5, false).await.unwrap();
    assert!(regenerated.generated_at > first.generated_at);
}

#[tokio::test]
async fn generation_event_spares_the_fresh_entry() {
    let state = AppState::new(Config::default()).await.unwrap();
    seed_demo(&state).await;

    let stale_event = EventEnvelope::new(
        EventType::RecommendationGenerated,
        "user-4",
        json!({"count": 0}),
    );
    let cached = state.cache.get_or_generate("user-4", 5, false).await.unwrap();

    // the event predates the cached entry, so the entry survives
    state.dispatcher.dispatch(stale_event).await;
    let still_cached = state.cache.get_or_generate("user-4", 5, false).await.unwrap();
    assert_eq!(cached, still_cached);
}
