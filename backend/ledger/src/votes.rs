//! # Voting
//!
//! Community upvotes/downvotes on submissions.
//!
//! ## Rules
//!
//! - A user holds at most one active vote per submission
//! - Voting the same direction twice retracts the vote
//! - Voting the opposite direction moves the vote
//! - Counters are always the size of their membership map
//!
//! ## Transaction
//!
//! [`apply_vote`] is a pure `(current, user, direction) -> next` transition. [`VoteLedger`] hands it to
//! [`ContentStore::update_submission`], which may replay it on a fresher document if another voter
//! committed first. Nothing else writes counters or membership.
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{LedgerError, StoreError},
    models::{Direction, Submission},
    store::ContentStore,
};

pub fn apply_vote(mut submission: Submission, user_id: &str, direction: Direction) -> Submission {
    let already = submission.has_voted(user_id, direction);

    submission.upvoted_by.retain(|_, voted| *voted);
    submission.downvoted_by.retain(|_, voted| *voted);

    match direction {
        Direction::Up => {
            submission.downvoted_by.remove(user_id);
            if already {
                submission.upvoted_by.remove(user_id);
            } else {
                submission.upvoted_by.insert(user_id.to_string(), true);
            }
        }
        Direction::Down => {
            submission.upvoted_by.remove(user_id);
            if already {
                submission.downvoted_by.remove(user_id);
            } else {
                submission.downvoted_by.insert(user_id.to_string(), true);
            }
        }
    }

    submission.upvotes = submission.upvoted_by.len() as u32;
    submission.downvotes = submission.downvoted_by.len() as u32;

    submission
}

pub struct VoteLedger {
    store: Arc<dyn ContentStore>,
}

impl VoteLedger {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Toggles `user_id`'s vote in `direction`. `None` means nobody is signed in.
    pub async fn toggle_vote(
        &self,
        submission_id: &str,
        user_id: Option<&str>,
        direction: Direction,
    ) -> Result<Submission, LedgerError> {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(LedgerError::Unauthorized)?;

        let transition = |current: Submission| apply_vote(current, user_id, direction);

        match self.store.update_submission(submission_id, &transition).await {
            Ok(submission) => {
                info!(
                    submission = submission_id,
                    user = user_id,
                    ?direction,
                    upvotes = submission.upvotes,
                    downvotes = submission.downvotes,
                    "Vote committed"
                );
                Ok(submission)
            }
            Err(StoreError::NotFound(id)) => Err(LedgerError::SubmissionNotFound(id)),
            Err(e) => {
                warn!("Vote on {submission_id} by {user_id} not applied: {e}");
                Err(LedgerError::VoteCommitFailed(e))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Verified,
    Contested,
    Disputed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    pub total: u32,
    pub upvote_percentage: u32,
    pub verdict: Verdict,
}

impl VoteSummary {
    pub fn of(submission: &Submission) -> Self {
        let total = submission.upvotes + submission.downvotes;
        let percentage = if total > 0 {
            submission.upvotes as f64 / total as f64 * 100.0
        } else {
            50.0
        };

        // thresholds use the unrounded value
        let verdict = if percentage > 75.0 {
            Verdict::Verified
        } else if percentage < 25.0 {
            Verdict::Disputed
        } else {
            Verdict::Contested
        };

        Self {
            total,
            upvote_percentage: percentage.round() as u32,
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::{
        models::{NewSubmission, User, VerificationRecord},
        store::{MemoryStore, UpdateFn},
    };

    fn submission(id: &str) -> Submission {
        Submission {
            id: id.to_string(),
            ..NewSubmission {
                title: "Moon landing".into(),
                content: "It happened.".into(),
            }
            .into_submission("author", 95)
        }
    }

    fn voters(s: &Submission, direction: Direction) -> Vec<&str> {
        s.voters(direction).keys().map(String::as_str).collect()
    }

    async fn ledger_with(ids: &[&str]) -> (VoteLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for id in ids {
            store.create_submission(submission(id)).await.unwrap();
        }
        (VoteLedger::new(store.clone()), store)
    }

    #[test]
    fn test_toggle_on() {
        let s = apply_vote(submission("s1"), "u1", Direction::Up);

        assert_eq!((s.upvotes, s.downvotes), (1, 0));
        assert_eq!(voters(&s, Direction::Up), vec!["u1"]);
    }

    #[test]
    fn test_double_toggle_restores() {
        let before = submission("s1");
        let once = apply_vote(before.clone(), "u1", Direction::Up);
        let twice = apply_vote(once, "u1", Direction::Up);

        assert_eq!(twice, before);
    }

    #[test]
    fn test_switch_retracts_opposite() {
        let s = apply_vote(submission("s1"), "u1", Direction::Up);
        let s = apply_vote(s, "u1", Direction::Down);

        assert_eq!((s.upvotes, s.downvotes), (0, 1));
        assert!(voters(&s, Direction::Up).is_empty());
        assert_eq!(voters(&s, Direction::Down), vec!["u1"]);
    }

    #[test]
    fn test_alternating_never_double_counts() {
        let mut s = submission("s1");
        let users = ["u1", "u2", "u3"];
        let mut ever_voted = std::collections::HashSet::new();

        for step in 0..30 {
            let user = users[step % users.len()];
            let direction = if step % 2 == 0 { Direction::Up } else { Direction::Down };
            ever_voted.insert(user);
            s = apply_vote(s, user, direction);

            for u in users {
                assert!(!(s.has_voted(u, Direction::Up) && s.has_voted(u, Direction::Down)));
            }
            assert_eq!(s.upvotes as usize, s.upvoted_by.len());
            assert_eq!(s.downvotes as usize, s.downvoted_by.len());
            assert!((s.upvotes + s.downvotes) as usize <= ever_voted.len());
        }
    }

    #[test]
    fn test_counters_follow_membership() {
        let mut s = submission("s1");
        s.upvotes = 7;
        s.downvotes = 0;
        s.upvoted_by = BTreeMap::from([("u9".to_string(), true), ("u8".to_string(), false)]);
        s.downvoted_by = BTreeMap::from([("u9".to_string(), true)]);

        let s = apply_vote(s, "u1", Direction::Down);

        assert_eq!(voters(&s, Direction::Up), vec!["u9"]);
        assert_eq!(voters(&s, Direction::Down), vec!["u1", "u9"]);
        assert_eq!((s.upvotes, s.downvotes), (1, 2));
    }

    #[tokio::test]
    async fn test_unauthorized_touches_nothing() {
        let (ledger, store) = ledger_with(&["s1"]).await;
        let before = store.submission("s1").await.unwrap().unwrap();

        for user in [None, Some(""), Some("   ")] {
            let result = ledger.toggle_vote("s1", user, Direction::Up).await;
            assert!(matches!(result, Err(LedgerError::Unauthorized)));
        }

        let stored = store.submission("s1").await.unwrap().unwrap();
        assert_eq!(stored, before);
        assert_eq!((stored.upvotes, stored.downvotes), (0, 0));
    }

    #[tokio::test]
    async fn test_unknown_submission() {
        let (ledger, _) = ledger_with(&[]).await;
        let result = ledger.toggle_vote("missing", Some("u1"), Direction::Down).await;

        assert!(matches!(result, Err(LedgerError::SubmissionNotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_vote_switch_and_second_voter() {
        let (ledger, store) = ledger_with(&["s1"]).await;

        let s = ledger.toggle_vote("s1", Some("u1"), Direction::Up).await.unwrap();
        assert_eq!((s.upvotes, s.downvotes), (1, 0));
        assert_eq!(voters(&s, Direction::Up), vec!["u1"]);

        let s = ledger.toggle_vote("s1", Some("u1"), Direction::Down).await.unwrap();
        assert_eq!((s.upvotes, s.downvotes), (0, 1));
        assert_eq!(voters(&s, Direction::Down), vec!["u1"]);

        ledger.toggle_vote("s1", Some("u2"), Direction::Up).await.unwrap();

        let s = store.submission("s1").await.unwrap().unwrap();
        assert_eq!((s.upvotes, s.downvotes), (1, 1));
        assert_eq!(voters(&s, Direction::Up), vec!["u2"]);
        assert_eq!(voters(&s, Direction::Down), vec!["u1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_voters_lose_nothing() {
        let users = 32;
        let store = Arc::new(MemoryStore::new().with_max_attempts(users + 1));
        store.create_submission(submission("s1")).await.unwrap();
        let ledger = Arc::new(VoteLedger::new(store.clone()));

        let handles: Vec<_> = (0..users)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    let user = format!("u{i}");
                    let direction = if i % 4 == 0 { Direction::Down } else { Direction::Up };
                    ledger.toggle_vote("s1", Some(user.as_str()), direction).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let s = store.submission("s1").await.unwrap().unwrap();
        assert_eq!(s.downvotes, 8);
        assert_eq!(s.upvotes, 24);
        assert_eq!(s.upvotes as usize, s.upvoted_by.len());
        assert_eq!(s.downvotes as usize, s.downvoted_by.len());
    }

    struct UnreachableStore;

    #[async_trait]
    impl ContentStore for UnreachableStore {
        async fn submission(&self, _: &str) -> Result<Option<Submission>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn submissions(&self) -> Result<Vec<Submission>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn create_submission(&self, _: Submission) -> Result<Submission, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn update_submission(
            &self,
            _: &str,
            _: UpdateFn<'_>,
        ) -> Result<Submission, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn users(&self) -> Result<Vec<User>, StoreError> {
            Ok(Vec::new())
        }

        async fn append_verification(&self, _: VerificationRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn recent_verifications(
            &self,
            _: usize,
        ) -> Result<Vec<VerificationRecord>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_commit_failure() {
        let ledger = VoteLedger::new(Arc::new(UnreachableStore));
        let result = ledger.toggle_vote("s1", Some("u1"), Direction::Up).await;

        assert!(matches!(result, Err(LedgerError::VoteCommitFailed(_))));
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_commit_failure() {
        let store = Arc::new(MemoryStore::new().with_max_attempts(0));
        store.create_submission(submission("s1")).await.unwrap();
        let ledger = VoteLedger::new(store.clone());

        let result = ledger.toggle_vote("s1", Some("u1"), Direction::Up).await;

        assert!(matches!(
            result,
            Err(LedgerError::VoteCommitFailed(StoreError::ConflictRetriesExhausted(0)))
        ));
        assert_eq!(store.submission("s1").await.unwrap().unwrap().upvotes, 0);
    }

    #[test]
    fn test_vote_summary() {
        let mut s = submission("s1");
        assert_eq!(
            VoteSummary::of(&s),
            VoteSummary { total: 0, upvote_percentage: 50, verdict: Verdict::Contested }
        );

        s.upvotes = 12;
        s.downvotes = 88;
        let summary = VoteSummary::of(&s);
        assert_eq!(summary.upvote_percentage, 12);
        assert_eq!(summary.verdict, Verdict::Disputed);

        s.upvotes = 76;
        s.downvotes = 24;
        assert_eq!(VoteSummary::of(&s).verdict, Verdict::Verified);

        s.upvotes = 3;
        s.downvotes = 1;
        assert_eq!(VoteSummary::of(&s).verdict, Verdict::Contested);
    }

    #[test]
    fn test_submitted_at_survives_votes() {
        let s = submission("s1");
        let at = s.submitted_at;
        let s = apply_vote(s, "u1", Direction::Up);

        assert_eq!(s.submitted_at, at);
        assert!(s.submitted_at <= Utc::now());
    }
}
