use crate::algorithms::{features, similarity, trainer, validator};
use crate::config::Config;
use crate::error::EngineError;
use crate::models::*;
use crate::services::bus::MessageBus;
use crate::services::registry::ModelRegistry;
use crate::services::store::ActivityStore;
use crate::utils::window_start;
use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct SchedulerState {
    running: Option<Uuid>,
    queue: VecDeque<Uuid>,
    jobs: HashMap<Uuid, TrainingJob>,
}

/// Owns the TrainingJob lifecycle: at most one job runs at a time, further
/// submissions queue FIFO, and every terminal transition records the
/// outcome, emits a lifecycle event, and starts the next queued job.
pub struct TrainingService {
    store: Arc<dyn ActivityStore>,
    registry: Arc<ModelRegistry>,
    bus: Arc<dyn MessageBus>,
    config: Arc<Config>,
    state: Mutex<SchedulerState>,
}

impl TrainingService {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        registry: Arc<ModelRegistry>,
        bus: Arc<dyn MessageBus>,
        config: Arc<Config>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            bus,
            config,
            state: Mutex::new(SchedulerState::default()),
        })
    }

    /// Always acknowledges synchronously; the outcome arrives via lifecycle
    /// events.
    pub async fn submit(self: &Arc<Self>, config: TrainingRunConfig) -> SubmitOutcome {
        let mut state = self.state.lock().await;

        if state.running.is_some() {
            let job = TrainingJob::new(config, JobStatus::Queued);
            let id = job.id;
            state.jobs.insert(id, job);
            state.queue.push_back(id);
            info!(%id, queued = state.queue.len(), "training job queued");
            return SubmitOutcome { status: SubmitStatus::Queued, id };
        }

        let job = TrainingJob::new(config, JobStatus::Running);
        let id = job.id;
        state.jobs.insert(id, job);
        state.running = Some(id);
        drop(state);

        self.spawn_run(id);
        info!(%id, "training job started");
        SubmitOutcome { status: SubmitStatus::Started, id }
    }

    pub async fn job(&self, id: Uuid) -> Option<TrainingJob> {
        self.state.lock().await.jobs.get(&id).cloned()
    }

    pub async fn jobs(&self) -> Vec<TrainingJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<TrainingJob> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.running.is_none() && state.queue.is_empty()
    }

    fn spawn_run(self: &Arc<Self>, id: Uuid) {
        let service = self.clone();
        tokio::spawn(async move {
            service.run_job(id).await;
        });
    }

    async fn run_job(self: Arc<Self>, id: Uuid) {
        self.emit(
            EventType::ModelTrainingStarted,
            id.to_string(),
            json!({"job_id": id}),
        )
        .await;

        let config = match self.job(id).await {
            Some(job) => job.config,
            None => {
                error!(%id, "job disappeared before execution");
                return;
            }
        };

        match self.train_once(&config).await {
            Ok((model, report)) => {
                let version = model.version.clone();
                match self.registry.publish(model) {
                    Ok(()) => {
                        self.finish(id, JobStatus::Completed, None, Some(report)).await;
                        self.emit(
                            EventType::RecommendationModelUpdated,
                            version.clone(),
                            json!({"job_id": id, "version": version}),
                        )
                        .await;
                    }
                    Err(e) => {
                        self.finish(id, JobStatus::Failed, Some(e.to_string()), Some(report)).await;
                        self.emit(
                            EventType::ModelTrainingFailed,
                            id.to_string(),
                            json!({"job_id": id, "error": e.to_string()}),
                        )
                        .await;
                    }
                }
            }
            Err(e) => {
                error!(%id, "training run failed: {e}");
                self.finish(id, JobStatus::Failed, Some(e.to_string()), None).await;
                self.emit(
                    EventType::ModelTrainingFailed,
                    id.to_string(),
                    json!({"job_id": id, "error": e.to_string()}),
                )
                .await;
            }
        }

        self.advance().await;
    }

    /// One full pipeline pass: window fetch, feature extraction, similarity,
    /// model build, holdout validation. A rejected model is reported on the
    /// job record but still returned for publication.
    async fn train_once(
        &self,
        config: &TrainingRunConfig,
    ) -> Result<(Model, ValidationReport), EngineError> {
        let cutoff = window_start(self.config.training.window_days);
        let activities = self
            .store
            .since(cutoff)
            .await
            .map_err(|e| EngineError::training(format!("activity window fetch failed: {e}")))?;

        info!(rows = activities.len(), "training window fetched");

        let (user_vectors, product_vectors) = features::extract(&activities);
        let similarity = similarity::build(&activities, self.config.training.min_cooccurrence);
        let model = trainer::build_model(
            &user_vectors,
            &product_vectors,
            similarity,
            config,
            self.config.recommendation.min_interactions,
            self.config.recommendation.top_categories,
        );

        let report = validator::evaluate(
            &model,
            &activities,
            self.config.training.precision_k,
            self.config.training.precision_threshold,
        );

        Ok((model, report))
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
        report: Option<ValidationReport>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            job.status = status;
            job.completed_at = Some(Utc::now());
            job.error = error;
            job.report = report;
        }
    }

    /// Pops the next queued job, if any, and starts it.
    async fn advance(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        state.running = None;

        let Some(next) = state.queue.pop_front() else {
            return;
        };
        if let Some(job) = state.jobs.get_mut(&next) {
            job.status = JobStatus::Running;
        }
        state.running = Some(next);
        drop(state);

        info!(id = %next, "starting next queued training job");
        self.spawn_run(next);
    }

    /// Hourly retrain: submits a default-config job only when nothing is
    /// running and the queue is empty; never preempts an in-flight cycle.
    pub fn spawn_periodic(self: &Arc<Self>) {
        let service = self.clone();
        let period = Duration::from_secs(self.config.training.retrain_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // immediate first tick
            loop {
                interval.tick().await;
                if service.is_idle().await {
                    let outcome = service.submit(service.config.training.run_config()).await;
                    info!(id = %outcome.id, "periodic retrain submitted");
                } else {
                    warn!("skipping periodic retrain, training already in flight");
                }
            }
        });
    }

    async fn emit(&self, event_type: EventType, aggregate_id: String, data: serde_json::Value) {
        let envelope = EventEnvelope::new(event_type, aggregate_id, data);
        if let Err(e) = self.bus.publish(envelope).await {
            warn!("failed to publish training lifecycle event: {e}");
        }
    }
}
