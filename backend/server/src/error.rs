use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ledger::{LedgerError, StoreError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::oracle::OracleError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Sign in required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("Vote was not applied, please try again")]
    VoteCommitFailed,

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<LedgerError> for AppError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Unauthorized => AppError::Unauthorized,
            LedgerError::SubmissionNotFound(id) => {
                AppError::NotFound(format!("Submission {id} not found"))
            }
            LedgerError::VoteCommitFailed(_) => AppError::VoteCommitFailed,
            LedgerError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::InternalError(Box::new(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::VoteCommitFailed => StatusCode::CONFLICT,
            AppError::Oracle(OracleError::EmptyInput(_) | OracleError::InvalidUrl(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Oracle(OracleError::ImageTooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Oracle(OracleError::AnalysisFailed(_)) => StatusCode::BAD_GATEWAY,
            AppError::InternalError(e) => {
                error!("Internal error: {e}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
