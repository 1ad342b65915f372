use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recwise::models::{Activity, ActivityKind, JobStatus};
use recwise::services::store::ActivityStore;
use recwise::{init_tracing, AppState, Config};
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Seed the demo dataset and run one training cycle")]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 40)]
    interactions: usize,
}

const CATEGORIES: [&str; 4] = ["books", "electronics", "clothing", "home"];

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().await;

    let args = Args::parse();
    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("config file not found, using default configuration");
        Config::default()
    };

    let state = AppState::new(config).await?;
    let mut rng = StdRng::seed_from_u64(args.seed);

    let users: Vec<String> = (1..=5).map(|i| format!("user-{i}")).collect();
    let products: Vec<(String, &str, f64)> = (1..=10)
        .map(|i| {
            let category = CATEGORIES[(i - 1) % CATEGORIES.len()];
            (format!("product-{i}"), category, 10.0 + 10.0 * i as f64)
        })
        .collect();

    for _ in 0..args.interactions {
        let user = &users[rng.gen_range(0..users.len())];
        let (product, category, price) = &products[rng.gen_range(0..products.len())];
        let kind = match rng.gen_range(0..10) {
            0..=5 => ActivityKind::View,
            6..=7 => ActivityKind::AddToCart,
            _ => ActivityKind::Purchase,
        };
        let minutes_ago = rng.gen_range(0..60 * 24 * 7);

        let activity = Activity::new(user.clone(), Some(product.clone()), kind)
            .with_payload(json!({"category": category, "price": price}))
            .with_occurred_at(Utc::now() - Duration::minutes(minutes_ago));
        state.store.append(activity).await?;
    }
    info!(interactions = args.interactions, "demo dataset seeded");

    let outcome = state.training_service.submit(state.config.training.run_config()).await;
    info!(id = %outcome.id, status = ?outcome.status, "training submitted");

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if let Some(job) = state.training_service.job(outcome.id).await {
            match job.status {
                JobStatus::Completed => {
                    if let Some(report) = job.report {
                        info!(
                            precision = report.precision,
                            coverage = report.coverage,
                            accepted = report.accepted,
                            "training completed"
                        );
                    }
                    break;
                }
                JobStatus::Failed => {
                    anyhow::bail!("training failed: {}", job.error.unwrap_or_default());
                }
                _ => {}
            }
        }
    }

    let response = state.cache.get_or_generate("user-1", 5, false).await?;
    info!(
        model = %response.model_version,
        "sample recommendations for user-1:"
    );
    for rec in &response.recommendations {
        info!(
            "  {} score={:.3} confidence={:.2} reason={}",
            rec.product_id, rec.score, rec.confidence, rec.reason
        );
    }

    Ok(())
}
