use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use recwise::services::bus::MessageBus;
use recwise::services::store::ActivityStore;
use recwise::{init_tracing, AppState, Config};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
    force_refresh: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn failure(data: T, message: String) -> Self {
        Self {
            success: false,
            data: Some(data),
            message,
        }
    }
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "recwise".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<RecommendationQuery>,
) -> Json<ApiResponse<recwise::RecommendationResponse>> {
    let limit = params.limit.unwrap_or(state.config.recommendation.default_limit);
    let force_refresh = params.force_refresh.unwrap_or(false);

    match state.cache.get_or_generate(&user_id, limit, force_refresh).await {
        Ok(response) => Json(ApiResponse::success(response)),
        Err(e) => {
            tracing::error!("failed to generate recommendations: {e}");
            // explicit failure result with an empty list, never a 500
            let empty = recwise::RecommendationResponse {
                user_id,
                recommendations: Vec::new(),
                model_version: String::new(),
                generated_at: Utc::now(),
            };
            Json(ApiResponse::failure(empty, e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActivityRequest {
    user_id: String,
    product_id: Option<String>,
    kind: recwise::ActivityKind,
    #[serde(default)]
    payload: serde_json::Value,
}

async fn record_activity(
    State(state): State<AppState>,
    Json(request): Json<ActivityRequest>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    let activity = recwise::Activity::new(request.user_id, request.product_id, request.kind)
        .with_payload(request.payload);
    let user_id = activity.user_id.clone();
    let event_type = recwise::EventType::for_activity(activity.kind);
    let data = serde_json::to_value(&activity).unwrap_or(serde_json::Value::Null);

    if let Err(e) = state.store.append(activity).await {
        tracing::error!("failed to record activity: {e}");
        return Err(StatusCode::BAD_REQUEST);
    }

    // store write and bus notification are not atomic; a failed publish
    // leaves the cache stale until TTL expiry
    let envelope = recwise::EventEnvelope::new(event_type, user_id, data);
    if let Err(e) = state.bus.publish(envelope).await {
        tracing::warn!("activity recorded but event publish failed: {e}");
    }

    Ok(Json(ApiResponse::success("Activity recorded".to_string())))
}

async fn submit_training_job(
    State(state): State<AppState>,
    body: Option<Json<recwise::TrainingRunConfig>>,
) -> Json<ApiResponse<recwise::SubmitOutcome>> {
    let config = body.map(|Json(c)| c).unwrap_or_default();
    let outcome = state.training_service.submit(config).await;
    Json(ApiResponse::success(outcome))
}

async fn get_training_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<recwise::TrainingJob>>, StatusCode> {
    match state.training_service.job(id).await {
        Some(job) => Ok(Json(ApiResponse::success(job))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn publish_model(
    State(state): State<AppState>,
    Json(push): Json<recwise::ModelPush>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    let version = push.version.clone();
    match state.registry.publish_push(push) {
        Ok(()) => {
            let envelope = recwise::EventEnvelope::new(
                recwise::EventType::RecommendationModelUpdated,
                version.clone(),
                serde_json::json!({"version": version}),
            );
            if let Err(e) = state.bus.publish(envelope).await {
                tracing::warn!("model published but event publish failed: {e}");
            }
            Ok(Json(ApiResponse::success(format!("Model {version} published"))))
        }
        Err(e) => {
            tracing::error!("model publish rejected: {e}");
            Err(StatusCode::UNPROCESSABLE_ENTITY)
        }
    }
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    version: String,
    trained_at: chrono::DateTime<Utc>,
    users: usize,
    products: usize,
}

async fn get_current_model(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ModelInfo>>, StatusCode> {
    match state.registry.current() {
        Some(model) => Ok(Json(ApiResponse::success(ModelInfo {
            version: model.version.clone(),
            trained_at: model.trained_at,
            users: model.user_profiles.len(),
            products: model.product_profiles.len(),
        }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/activities", post(record_activity))
        .route("/training/jobs", post(submit_training_job))
        .route("/training/jobs/:id", get(get_training_job))
        .route("/models/publish", post(publish_model))
        .route("/models/current", get(get_current_model))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().await;

    let config = Config::default();
    info!("starting recwise server with config: {:?}", config.server);

    let state = AppState::new(config.clone()).await?;
    state.start_background();

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    info!("server listening on {}", config.server.socket_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
