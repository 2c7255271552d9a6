use autoscale_cuckoo_filter::CuckooFilter;
use std::sync::RwLock;

use crate::error::AppResult;
use crate::store::UserStore;

/// Expected capacity and false-positive rate.
/// Tune these based on real user counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Probabilistic set of registered emails. A miss means the email is
/// certainly free; a hit still needs the store to confirm.
pub struct EmailFilter {
    inner: RwLock<CuckooFilter<String>>,
}

impl Default for EmailFilter {
    fn default() -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
        }
    }
}

#[inline]
fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

impl EmailFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an email might be registered (false positives possible)
    pub fn might_exist(&self, email: &str) -> bool {
        let email = normalize(email);
        match self.inner.read() {
            Ok(filter) => filter.contains(&email),
            // A poisoned filter can only answer "maybe".
            Err(_) => true,
        }
    }

    pub fn insert(&self, email: &str) {
        let email = normalize(email);
        if let Ok(mut filter) = self.inner.write() {
            filter.add(&email);
        }
    }

    pub fn remove(&self, email: &str) {
        let email = normalize(email);
        if let Ok(mut filter) = self.inner.write() {
            filter.remove(&email);
        }
    }

    /// Warm up the filter from the user store in batches
    pub async fn warmup(&self, users: &dyn UserStore, batch_size: usize) -> AppResult<usize> {
        let emails: Vec<String> = users
            .list_all()
            .await?
            .into_iter()
            .map(|u| normalize(&u.email))
            .collect();

        for batch in emails.chunks(batch_size.max(1)) {
            self.insert_batch(batch);
        }

        log::info!("Email filter warmup complete: {} users", emails.len());
        Ok(emails.len())
    }

    /// Insert a batch of normalized emails
    fn insert_batch(&self, emails: &[String]) {
        if let Ok(mut filter) = self.inner.write() {
            for email in emails {
                filter.add(email);
            }
        }
    }
}
