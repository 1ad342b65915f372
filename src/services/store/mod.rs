use crate::models::{Activity, ProductId};
use crate::utils::validation::validate_activity;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::info;

/// Append-only activity log. Owned by an external collaborator in
/// production; the engine only reads through this interface.
#[async_trait::async_trait]
pub trait ActivityStore: Send + Sync {
    async fn append(&self, activity: Activity) -> Result<()>;

    /// Most-recent `limit` activities for one user, in chronological order.
    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Activity>>;

    /// All activities with `occurred_at >= cutoff`.
    async fn since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Activity>>;

    /// Every product id that has appeared in the log.
    async fn product_ids(&self) -> Result<HashSet<ProductId>>;
}

/// In-process store backing development, tests, and the demo seeder.
pub struct InMemoryActivityStore {
    activities: RwLock<Vec<Activity>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self { activities: RwLock::new(Vec::new()) }
    }

    pub async fn len(&self) -> usize {
        self.activities.read().await.len()
    }
}

impl Default for InMemoryActivityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn append(&self, activity: Activity) -> Result<()> {
        validate_activity(&activity)?;
        let mut activities = self.activities.write().await;
        activities.push(activity);
        info!(total = activities.len(), "recorded activity");
        Ok(())
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Activity>> {
        let activities = self.activities.read().await;
        let mut rows: Vec<Activity> = activities
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.occurred_at);
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        Ok(rows)
    }

    async fn since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Activity>> {
        let activities = self.activities.read().await;
        Ok(activities
            .iter()
            .filter(|a| a.occurred_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn product_ids(&self) -> Result<HashSet<ProductId>> {
        let activities = self.activities.read().await;
        Ok(activities
            .iter()
            .filter_map(|a| a.product_id.clone())
            .collect())
    }
}
