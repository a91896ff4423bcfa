use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Write conflict persisted after {0} attempts")]
    ConflictRetriesExhausted(usize),

    #[error("Document {0} not found")]
    NotFound(String),

    #[error("Malformed document {key}: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Voting requires a signed in user")]
    Unauthorized,

    #[error("Submission {0} not found")]
    SubmissionNotFound(String),

    #[error("Vote was not applied: {0}")]
    VoteCommitFailed(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
