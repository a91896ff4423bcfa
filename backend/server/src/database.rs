//! # Redis
//!
//! Content store for submissions, users and verification records.
//!
//! ## Layout
//!
//! - `submission:{id}`: JSON submission document
//! - `submissions`: list of submission ids in creation order
//! - `users`: hash of user id to JSON user
//! - `verifications`: list of JSON verification records, newest at the tail
//!
//! ## Votes
//!
//! Vote toggles are optimistic transactions: `WATCH` the document, read it, run the transition,
//! then `MULTI`/`SET`/`EXEC`. A nil `EXEC` means someone else wrote first, so we read again.
//! `WATCH` state is per connection, so each transaction checks a dedicated connection out of a
//! small idle pool instead of borrowing the shared manager. Connections go back only when no
//! `WATCH` is left pending on them.
use std::time::Duration;

use async_trait::async_trait;
use ledger::{
    ContentStore, StoreError, Submission, User, VerificationRecord, store::UpdateFn,
};
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig, MultiplexedConnection},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const SUBMISSION_PREFIX: &str = "submission:";
pub const SUBMISSIONS: &str = "submissions";
pub const USERS: &str = "users";
pub const VERIFICATIONS: &str = "verifications";

const MAX_IDLE_TRANSACTIONS: usize = 8;

pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
    transactions: Mutex<Vec<MultiplexedConnection>>,
    max_attempts: usize,
}

pub async fn init_redis(redis_url: &str, max_attempts: usize) -> Result<RedisStore, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection = client.get_connection_manager_with_config(config).await?;

    Ok(RedisStore {
        client,
        connection,
        transactions: Mutex::new(Vec::new()),
        max_attempts,
    })
}

impl RedisStore {
    async fn checkout(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(connection) = self.transactions.lock().await.pop() {
            return Ok(connection);
        }

        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)
    }

    async fn checkin(&self, connection: MultiplexedConnection) {
        let mut idle = self.transactions.lock().await;
        if idle.len() < MAX_IDLE_TRANSACTIONS {
            idle.push(connection);
        }
    }

    /// Runs the optimistic transaction loop on one connection.
    async fn transact(
        &self,
        connection: &mut MultiplexedConnection,
        key: &str,
        id: &str,
        update: UpdateFn<'_>,
    ) -> Result<Submission, StoreError> {
        for attempt in 1..=self.max_attempts {
            redis::cmd("WATCH")
                .arg(key)
                .query_async::<()>(&mut *connection)
                .await
                .map_err(unavailable)?;

            let raw: Option<String> = connection.get(key).await.map_err(unavailable)?;
            let Some(raw) = raw else {
                redis::cmd("UNWATCH")
                    .query_async::<()>(&mut *connection)
                    .await
                    .map_err(unavailable)?;
                return Err(StoreError::NotFound(id.to_string()));
            };

            let next = update(decode(key, &raw)?);
            let json = encode(key, &next)?;

            let committed: Option<()> = redis::pipe()
                .atomic()
                .set(key, json)
                .ignore()
                .query_async(&mut *connection)
                .await
                .map_err(unavailable)?;

            if committed.is_some() {
                return Ok(next);
            }

            debug!("Conflict on {key}, attempt {attempt}");
            #[cfg(feature = "verbose")]
            println!("Retrying transaction on {key} after attempt {attempt}");
        }

        Err(StoreError::ConflictRetriesExhausted(self.max_attempts))
    }
}

fn submission_key(id: &str) -> String {
    format!("{SUBMISSION_PREFIX}{id}")
}

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

/// Decodes what it can, logs and skips the rest.
fn decode_all<T: DeserializeOwned>(key: &str, raws: Vec<Option<String>>) -> Vec<T> {
    raws.into_iter()
        .flatten()
        .filter_map(|raw| {
            decode(key, &raw)
                .map_err(|e| warn!("Skipping document: {e}"))
                .ok()
        })
        .collect()
}

#[async_trait]
impl ContentStore for RedisStore {
    async fn submission(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        let key = submission_key(id);
        let raw: Option<String> = self.connection.clone().get(&key).await.map_err(unavailable)?;

        raw.map(|raw| decode(&key, &raw)).transpose()
    }

    async fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
        let mut connection = self.connection.clone();

        let ids: Vec<String> = connection
            .lrange(SUBMISSIONS, 0, -1)
            .await
            .map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| submission_key(id)).collect();
        let raws: Vec<Option<String>> = connection.mget(&keys).await.map_err(unavailable)?;

        Ok(decode_all(SUBMISSIONS, raws))
    }

    async fn create_submission(&self, submission: Submission) -> Result<Submission, StoreError> {
        let key = submission_key(&submission.id);
        let json = encode(&key, &submission)?;

        redis::pipe()
            .atomic()
            .set(&key, json)
            .ignore()
            .rpush(SUBMISSIONS, &submission.id)
            .ignore()
            .query_async::<()>(&mut self.connection.clone())
            .await
            .map_err(unavailable)?;

        Ok(submission)
    }

    async fn update_submission(
        &self,
        id: &str,
        update: UpdateFn<'_>,
    ) -> Result<Submission, StoreError> {
        let key = submission_key(id);
        let mut connection = self.checkout().await?;

        let result = self.transact(&mut connection, &key, id, update).await;
        if matches!(
            result,
            Ok(_) | Err(StoreError::NotFound(_) | StoreError::ConflictRetriesExhausted(_))
        ) {
            self.checkin(connection).await;
        }

        result
    }

    async fn users(&self) -> Result<Vec<User>, StoreError> {
        let raws: Vec<String> = self
            .connection
            .clone()
            .hvals(USERS)
            .await
            .map_err(unavailable)?;

        Ok(decode_all(USERS, raws.into_iter().map(Some).collect()))
    }

    async fn append_verification(&self, record: VerificationRecord) -> Result<(), StoreError> {
        let json = encode(VERIFICATIONS, &record)?;

        self.connection
            .clone()
            .rpush(VERIFICATIONS, json)
            .await
            .map_err(unavailable)
    }

    async fn recent_verifications(
        &self,
        limit: usize,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let start = -(limit.min(isize::MAX as usize) as isize);
        let raws: Vec<String> = self
            .connection
            .clone()
            .lrange(VERIFICATIONS, start, -1)
            .await
            .map_err(unavailable)?;

        Ok(decode_all(VERIFICATIONS, raws.into_iter().map(Some).collect()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use ledger::{Direction, NewSubmission, VoteLedger, apply_vote};
    use redis::Commands;

    use super::*;

    /// Live Redis tests only run when `REDIS_TEST_URL` points at a scratch instance.
    fn live_url() -> Option<String> {
        std::env::var("REDIS_TEST_URL").ok()
    }

    fn new_submission() -> Submission {
        NewSubmission {
            title: "Bridge opens".into(),
            content: "The new bridge opened today.".into(),
        }
        .into_submission("author", 80)
    }

    #[test]
    fn test_keys() {
        assert_eq!(submission_key("abc"), "submission:abc");
    }

    #[test]
    fn test_decode_all_skips_malformed() {
        let raws = vec![
            Some(r#"{"summary":"Moon landing faked","score":5,"analyzedAt":"2024-07-15T10:00:00Z"}"#.to_string()),
            Some("not json".to_string()),
            None,
            Some(r#"{"summary":null,"analyzedAt":"2024-07-15T10:00:00Z"}"#.to_string()),
        ];

        let records: Vec<VerificationRecord> = decode_all(VERIFICATIONS, raws);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].score, Some(5.0));
        assert_eq!(records[1].summary, None);
    }

    #[test]
    fn test_decode_reports_key() {
        let result: Result<Submission, _> = decode("submission:x", "{");

        assert!(matches!(result, Err(StoreError::Malformed { key, .. }) if key == "submission:x"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_conflicting_write_forces_retry() {
        let Some(url) = live_url() else { return };
        let store = init_redis(&url, 4).await.unwrap();
        let created = store.create_submission(new_submission()).await.unwrap();
        let key = submission_key(&created.id);
        let calls = AtomicUsize::new(0);

        let committed = store
            .update_submission(&created.id, &|s| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    let mut rival = s.clone();
                    rival.downvoted_by.insert("rival".into(), true);
                    rival.downvotes = 1;
                    let mut side = Client::open(url.as_str()).unwrap().get_connection().unwrap();
                    let _: () = side.set(&key, serde_json::to_string(&rival).unwrap()).unwrap();
                }
                apply_vote(s, "u1", Direction::Up)
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(committed.has_voted("rival", Direction::Down));
        assert!(committed.has_voted("u1", Direction::Up));
        assert_eq!((committed.upvotes, committed.downvotes), (1, 1));
        assert_eq!(store.submission(&created.id).await.unwrap(), Some(committed));
        assert_eq!(store.transactions.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_connection_is_reused() {
        let Some(url) = live_url() else { return };
        let store = init_redis(&url, 4).await.unwrap();
        let created = store.create_submission(new_submission()).await.unwrap();

        for _ in 0..3 {
            store
                .update_submission(&created.id, &|s| apply_vote(s, "u1", Direction::Down))
                .await
                .unwrap();
        }
        let missing = store.update_submission("missing", &|s| s).await;

        assert!(matches!(missing, Err(StoreError::NotFound(_))));
        assert_eq!(store.transactions.lock().await.len(), 1);
        let stored = store.submission(&created.id).await.unwrap().unwrap();
        assert_eq!((stored.upvotes, stored.downvotes), (0, 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_against_redis() {
        let Some(url) = live_url() else { return };
        let users = 24;
        let store = Arc::new(init_redis(&url, users + 1).await.unwrap());
        let created = store.create_submission(new_submission()).await.unwrap();
        let ledger = Arc::new(VoteLedger::new(store.clone()));

        let handles: Vec<_> = (0..users)
            .map(|i| {
                let ledger = ledger.clone();
                let id = created.id.clone();
                tokio::spawn(async move {
                    let user = format!("u{i}");
                    let direction = if i % 3 == 0 { Direction::Down } else { Direction::Up };
                    ledger.toggle_vote(&id, Some(user.as_str()), direction).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.submission(&created.id).await.unwrap().unwrap();
        assert_eq!((stored.upvotes, stored.downvotes), (16, 8));
        assert!(store.transactions.lock().await.len() <= MAX_IDLE_TRANSACTIONS);
    }
}
