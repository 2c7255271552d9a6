use moka::future::Cache;
use std::time::Duration;

use crate::error::AppResult;
use crate::model::user::UserSummary;
use crate::store::UserStore;

/// Name cards keyed by user id, used to annotate reports and tasks without a
/// store round-trip per row.
#[derive(Clone)]
pub struct UserCache {
    inner: Cache<u64, UserSummary>,
}

impl Default for UserCache {
    fn default() -> Self {
        Self::new(50_000, Duration::from_secs(3600))
    }
}

impl UserCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn put(&self, summary: UserSummary) {
        self.inner.insert(summary.id, summary).await;
    }

    pub async fn invalidate(&self, user_id: u64) {
        self.inner.invalidate(&user_id).await;
    }

    /// Cached summary, falling back to the store. `None` for unknown users.
    pub async fn get_or_load(
        &self,
        user_id: u64,
        users: &dyn UserStore,
    ) -> AppResult<Option<UserSummary>> {
        if let Some(summary) = self.inner.get(&user_id).await {
            return Ok(Some(summary));
        }

        let Some(user) = users.find_by_id(user_id).await? else {
            return Ok(None);
        };
        let summary = user.summary();
        self.put(summary.clone()).await;
        Ok(Some(summary))
    }

    /// Load every user into the cache (batched)
    pub async fn warmup(&self, users: &dyn UserStore, batch_size: usize) -> AppResult<usize> {
        let all = users.list_all().await?;

        for batch in all.chunks(batch_size.max(1)) {
            let futures: Vec<_> = batch.iter().map(|u| self.put(u.summary())).collect();
            // Await all insertions concurrently
            futures::future::join_all(futures).await;
        }

        log::info!("User cache warmup complete: {} users", all.len());
        Ok(all.len())
    }
}
