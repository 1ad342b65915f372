use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::models::TrainingRunConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub bus: BusConfig,
    pub training: TrainingConfig,
    pub recommendation: RecommendationConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().unwrap()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub view_weight: f64,
    pub add_to_cart_weight: f64,
    pub purchase_weight: f64,
    pub time_decay: f64,
    pub window_days: i64,
    pub min_cooccurrence: u64,
    pub precision_k: usize,
    pub precision_threshold: f64,
    pub retrain_interval_secs: u64,
}

impl TrainingConfig {
    pub fn run_config(&self) -> TrainingRunConfig {
        use crate::models::ActivityKind;
        let mut weights = std::collections::HashMap::new();
        weights.insert(ActivityKind::View, self.view_weight);
        weights.insert(ActivityKind::AddToCart, self.add_to_cart_weight);
        weights.insert(ActivityKind::Purchase, self.purchase_weight);
        TrainingRunConfig { weights, time_decay: self.time_decay }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub min_interactions: usize,
    pub recent_events_limit: usize,
    pub similar_window_days: i64,
    pub popularity_window_days: i64,
    pub min_shared_products: usize,
    pub similar_user_cap: usize,
    pub top_categories: usize,
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: num_cpus::get(),
            },
            bus: BusConfig { capacity: 1024 },
            training: TrainingConfig {
                view_weight: 1.0,
                add_to_cart_weight: 2.5,
                purchase_weight: 5.0,
                time_decay: 0.9,
                window_days: 30,
                min_cooccurrence: 3,
                precision_k: 10,
                precision_threshold: 0.10,
                retrain_interval_secs: 3600,
            },
            recommendation: RecommendationConfig {
                min_interactions: 3,
                recent_events_limit: 100,
                similar_window_days: 30,
                popularity_window_days: 7,
                min_shared_products: 2,
                similar_user_cap: 50,
                top_categories: 5,
                default_limit: 10,
            },
            cache: CacheConfig { ttl_seconds: 300 },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("RECWISE"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
