//! # Ledger
//!
//! Community verification core shared by the server and its tools.
//!
//! ## Overall Data Structures
//!
//! - Submission: a news story posted for the community to judge. Upvote/downvote counters plus the
//!   `{[userId]: true}` membership maps behind them.
//! - Verification record: written after every completed text or URL analysis. Summary, score, timestamp.
//!   Append only.
//! - Trending topic: derived from the latest records on every refresh, never stored.
//!
//! ## Modules
//!
//! - [`votes`]: the toggle transition and the ledger that commits it
//! - [`trending`]: grouping and ranking of verification records
//! - [`hydrate`]: joining users onto submissions, leaderboard ordering
//! - [`store`]: the content store contract plus an in-memory implementation
//!
//! ## Notes
//!
//! - Only [`votes::VoteLedger`] writes counters or membership, always through one atomic update.
//! - Everything apart from the ledger and the store is synchronous and pure, cheap to rerun on each snapshot.
pub mod error;
pub mod hydrate;
pub mod models;
pub mod store;
pub mod trending;
pub mod votes;

pub use error::{LedgerError, StoreError};
pub use models::{
    Direction, Evidence, NewSubmission, ScoreBand, Submission, TrendingTopic, User,
    VerificationRecord,
};
pub use store::{ContentStore, MemoryStore};
pub use trending::compute_trending;
pub use votes::{VoteLedger, VoteSummary, apply_vote};
