//! # Content Store
//!
//! Document store contract the ledger runs against.
//!
//! ## Requirements
//!
//! - Atomic read-modify-write on a single submission document
//! - Retry on stale-read conflict, bounded number of attempts
//! - Append-only verification log, read back as the most recent N records in write order
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: versioned documents behind a lock, used for tests and local runs
//! - `RedisStore` in the server crate: `WATCH`/`MULTI`/`EXEC` against Redis
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    error::StoreError,
    models::{Submission, User, VerificationRecord},
};

pub const DEFAULT_MAX_ATTEMPTS: usize = 16;

pub type UpdateFn<'a> = &'a (dyn Fn(Submission) -> Submission + Send + Sync);

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn submission(&self, id: &str) -> Result<Option<Submission>, StoreError>;

    async fn submissions(&self) -> Result<Vec<Submission>, StoreError>;

    async fn create_submission(&self, submission: Submission) -> Result<Submission, StoreError>;

    /// Applies `update` to the current document and commits the result atomically.
    ///
    /// `update` may run more than once when a concurrent writer wins the race, so it
    /// must be a pure function of its input. Returns the committed document.
    async fn update_submission(&self, id: &str, update: UpdateFn<'_>)
    -> Result<Submission, StoreError>;

    async fn users(&self) -> Result<Vec<User>, StoreError>;

    async fn append_verification(&self, record: VerificationRecord) -> Result<(), StoreError>;

    /// Most recent `limit` records, oldest first.
    async fn recent_verifications(&self, limit: usize)
    -> Result<Vec<VerificationRecord>, StoreError>;
}

#[derive(Default)]
struct Inner {
    submissions: HashMap<String, (u64, Submission)>,
    order: Vec<String>,
    users: Vec<User>,
    verifications: Vec<VerificationRecord>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_attempts: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn insert_user(&self, user: User) {
        let mut inner = self.inner.write().await;
        inner.users.retain(|u| u.id != user.id);
        inner.users.push(user);
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn submission(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.submissions.get(id).map(|(_, s)| s.clone()))
    }

    async fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.submissions.get(id))
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn create_submission(&self, submission: Submission) -> Result<Submission, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.submissions.contains_key(&submission.id) {
            inner.order.push(submission.id.clone());
        }
        inner
            .submissions
            .insert(submission.id.clone(), (0, submission.clone()));

        Ok(submission)
    }

    async fn update_submission(
        &self,
        id: &str,
        update: UpdateFn<'_>,
    ) -> Result<Submission, StoreError> {
        for attempt in 1..=self.max_attempts {
            let (version, current) = {
                let inner = self.inner.read().await;
                inner
                    .submissions
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(id.to_string()))?
            };

            let next = update(current);

            let mut inner = self.inner.write().await;
            match inner.submissions.get_mut(id) {
                Some(entry) if entry.0 == version => {
                    *entry = (version + 1, next.clone());
                    return Ok(next);
                }
                Some(_) => {
                    debug!("Conflict on submission {id}, attempt {attempt}");
                }
                None => return Err(StoreError::NotFound(id.to_string())),
            }
        }

        Err(StoreError::ConflictRetriesExhausted(self.max_attempts))
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.users.clone())
    }

    async fn append_verification(&self, record: VerificationRecord) -> Result<(), StoreError> {
        self.inner.write().await.verifications.push(record);
        Ok(())
    }

    async fn recent_verifications(
        &self,
        limit: usize,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        let inner = self.inner.read().await;
        let start = inner.verifications.len().saturating_sub(limit);
        Ok(inner.verifications[start..].to_vec())
    }
}
