use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub type UserId = String;
pub type ProductId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    View,
    AddToCart,
    Purchase,
    Search,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivityKind::View => "view",
            ActivityKind::AddToCart => "add_to_cart",
            ActivityKind::Purchase => "purchase",
            ActivityKind::Search => "search",
        };
        write!(f, "{s}")
    }
}

/// A single user interaction, immutable once recorded. Product metadata
/// (`category`, `price`) travels in the payload; search activities carry no
/// product id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: UserId,
    pub product_id: Option<ProductId>,
    pub kind: ActivityKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        user_id: impl Into<UserId>,
        product_id: Option<ProductId>,
        kind: ActivityKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            product_id,
            kind,
            payload: serde_json::Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn payload_price(&self) -> Option<f64> {
        self.payload.get("price").and_then(|v| v.as_f64())
    }

    pub fn payload_category(&self) -> Option<&str> {
        self.payload.get("category").and_then(|v| v.as_str())
    }
}

/// Per-user aggregate over one training window. Recomputed fully each run,
/// never persisted.
#[derive(Debug, Clone, Default)]
pub struct UserVector {
    pub viewed: HashSet<ProductId>,
    pub purchased: HashSet<ProductId>,
    pub carted: HashSet<ProductId>,
    /// Category frequency in first-occurrence order, for stable tie-breaks.
    pub category_counts: Vec<(String, u64)>,
    pub price_sum: f64,
    pub priced_views: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

impl UserVector {
    pub fn bump_category(&mut self, category: &str) {
        if let Some(entry) = self.category_counts.iter_mut().find(|(c, _)| c == category) {
            entry.1 += 1;
        } else {
            self.category_counts.push((category.to_string(), 1));
        }
    }

    pub fn avg_viewed_price(&self) -> f64 {
        if self.priced_views == 0 {
            0.0
        } else {
            self.price_sum / self.priced_views as f64
        }
    }

    /// Top categories by count descending; ties keep first-occurrence order.
    pub fn top_categories(&self, k: usize) -> Vec<String> {
        let mut indexed: Vec<(usize, &(String, u64))> =
            self.category_counts.iter().enumerate().collect();
        indexed.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then(a.0.cmp(&b.0)));
        indexed.into_iter().take(k).map(|(_, (c, _))| c.clone()).collect()
    }
}

/// Per-product aggregate over one training window.
#[derive(Debug, Clone, Default)]
pub struct ProductVector {
    pub category: Option<String>,
    pub price: f64,
    pub view_count: u64,
    pub cart_count: u64,
    pub purchase_count: u64,
    pub unique_users: HashSet<UserId>,
}

/// Unordered product pair, normalized lexicographically so each pair has a
/// single map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductPair(pub ProductId, pub ProductId);

impl ProductPair {
    pub fn new(a: impl Into<ProductId>, b: impl Into<ProductId>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn contains(&self, product: &str) -> bool {
        self.0 == product || self.1 == product
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub view_count: u64,
    pub purchase_count: u64,
    pub cart_count: u64,
    pub preferred_categories: Vec<String>,
    pub avg_price_range: f64,
    pub last_activity: DateTime<Utc>,
    pub engagement_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductProfile {
    pub category: String,
    pub price: f64,
    pub popularity_score: f64,
    pub conversion_rate: f64,
    pub unique_users: u64,
}

/// Immutable model artifact. A training run produces a new `Model`; the
/// served one is never edited in place.
#[derive(Debug, Clone)]
pub struct Model {
    pub version: String,
    pub user_profiles: HashMap<UserId, UserProfile>,
    pub product_profiles: HashMap<ProductId, ProductProfile>,
    pub similarity: HashMap<ProductPair, f64>,
    pub weights: HashMap<ActivityKind, f64>,
    pub time_decay: f64,
    pub min_interactions: usize,
    pub trained_at: DateTime<Utc>,
}

/// Per-run training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRunConfig {
    pub weights: HashMap<ActivityKind, f64>,
    pub time_decay: f64,
}

impl Default for TrainingRunConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert(ActivityKind::View, 1.0);
        weights.insert(ActivityKind::AddToCart, 2.5);
        weights.insert(ActivityKind::Purchase, 5.0);
        Self { weights, time_decay: 0.9 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    pub id: Uuid,
    pub config: TrainingRunConfig,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub report: Option<ValidationReport>,
}

impl TrainingJob {
    pub fn new(config: TrainingRunConfig, status: JobStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            status,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            report: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Started,
    Queued,
}

/// Synchronous acknowledgment of a training submission; the outcome arrives
/// later via lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub status: SubmitStatus,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub precision: f64,
    pub coverage: f64,
    pub hits: usize,
    pub tested: usize,
    pub accepted: bool,
}

pub const REASON_POPULAR: &str = "popular_products";
pub const REASON_COLLABORATIVE: &str = "collaborative_filtering";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub score: f64,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: UserId,
    pub recommendations: Vec<Recommendation>,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    UserViewedProduct,
    UserAddedToCart,
    UserPurchasedProduct,
    UserSearchedProducts,
    RecommendationGenerated,
    RecommendationModelUpdated,
    ModelTrainingStarted,
    ModelTrainingFailed,
}

impl EventType {
    pub fn for_activity(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::View => EventType::UserViewedProduct,
            ActivityKind::AddToCart => EventType::UserAddedToCart,
            ActivityKind::Purchase => EventType::UserPurchasedProduct,
            ActivityKind::Search => EventType::UserSearchedProducts,
        }
    }

    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            EventType::UserViewedProduct
                | EventType::UserAddedToCart
                | EventType::UserPurchasedProduct
                | EventType::UserSearchedProducts
        )
    }
}

/// Serialized event envelope carried over the message bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub aggregate_id: String,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            data,
            aggregate_id: aggregate_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Cross-service model push payload. Carries hyperparameters only; profile
/// maps stay with the service that trained them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPush {
    pub version: String,
    pub model_type: String,
    pub weights: HashMap<ActivityKind, f64>,
    pub time_decay: f64,
    pub min_interactions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_pair_is_order_insensitive() {
        assert_eq!(ProductPair::new("b", "a"), ProductPair::new("a", "b"));
        assert!(ProductPair::new("a", "b").contains("a"));
        assert!(!ProductPair::new("a", "b").contains("c"));
    }

    #[test]
    fn top_categories_break_ties_by_first_occurrence() {
        let mut vector = UserVector::default();
        vector.bump_category("books");
        vector.bump_category("games");
        vector.bump_category("games");
        vector.bump_category("music");
        // books and music tie at 1; books was seen first
        assert_eq!(
            vector.top_categories(2),
            vec!["games".to_string(), "books".to_string()]
        );
    }

    #[test]
    fn avg_viewed_price_guards_zero_views() {
        let vector = UserVector::default();
        assert_eq!(vector.avg_viewed_price(), 0.0);
    }

    #[test]
    fn activity_event_mapping_covers_all_kinds() {
        assert_eq!(
            EventType::for_activity(ActivityKind::View),
            EventType::UserViewedProduct
        );
        assert_eq!(
            EventType::for_activity(ActivityKind::Search),
            EventType::UserSearchedProducts
        );
        assert!(EventType::UserAddedToCart.is_activity());
        assert!(!EventType::RecommendationModelUpdated.is_activity());
    }
}
