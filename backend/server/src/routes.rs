use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
};
use ledger::{
    Direction, NewSubmission, ScoreBand, Submission, VerificationRecord, VoteSummary,
    hydrate::{hydrate_submissions, leaderboard},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::AppError,
    feed::TrendingSnapshot,
    oracle::TextAnalysis,
    state::State,
    utils::{MaybeUser, clamp_limit, decode_data_uri},
};

type AppState = AxumState<Arc<State>>;

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn submissions_handler(AxumState(state): AppState) -> Result<impl IntoResponse, AppError> {
    let (submissions, users) = tokio::try_join!(state.store.submissions(), state.store.users())?;

    Ok(Json(hydrate_submissions(submissions, &users)))
}

pub async fn create_submission_handler(
    AxumState(state): AppState,
    user: MaybeUser,
    Json(payload): Json<NewSubmission>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.require()?;

    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return Err(AppError::MalformedPayload("title and content are required".into()));
    }

    let analysis = state.oracle.score_text(&payload.content).await?;

    let submission = state
        .store
        .create_submission(payload.into_submission(user_id, analysis.truthfulness_percentage))
        .await?;
    info!(
        "Submission {} created by {user_id}, scored {}",
        submission.id, submission.ai_score
    );

    Ok((StatusCode::CREATED, Json(submission)))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub direction: Direction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub submission: Submission,
    pub votes: VoteSummary,
}

pub async fn vote_handler(
    AxumState(state): AppState,
    Path(id): Path<String>,
    user: MaybeUser,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let submission = state
        .ledger
        .toggle_vote(&id, user.as_deref(), payload.direction)
        .await?;

    Ok(Json(VoteResponse {
        votes: VoteSummary::of(&submission),
        submission,
    }))
}

#[derive(Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<i64>,
}

pub async fn trending_handler(
    AxumState(state): AppState,
    Query(query): Query<TrendingQuery>,
) -> impl IntoResponse {
    let latest = state.trending.latest();
    let limit = clamp_limit(query.limit, state.config.trending_limit);

    Json(TrendingSnapshot {
        topics: latest.topics.iter().take(limit).cloned().collect(),
        refreshed_at: latest.refreshed_at,
    })
}

pub async fn leaderboard_handler(AxumState(state): AppState) -> Result<impl IntoResponse, AppError> {
    Ok(Json(leaderboard(state.store.users().await?)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse<T: Serialize> {
    #[serde(flatten)]
    pub analysis: T,
    pub band: ScoreBand,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRequest {
    pub news_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub photo_data_uri: String,
}

#[derive(Deserialize)]
pub struct UrlRequest {
    pub url: String,
}

pub async fn analyze_text_handler(
    AxumState(state): AppState,
    Json(payload): Json<TextRequest>,
) -> Result<impl IntoResponse, AppError> {
    let analysis = state.oracle.score_text(&payload.news_text).await?;
    record_verification(&state, &analysis).await;

    Ok(Json(AnalysisResponse {
        band: ScoreBand::from_score(analysis.truthfulness_percentage as f64),
        analysis,
    }))
}

pub async fn analyze_image_handler(
    AxumState(state): AppState,
    Json(payload): Json<ImageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (mime, image) = decode_data_uri(&payload.photo_data_uri)?;
    let analysis = state.oracle.score_image(&image, &mime).await?;

    Ok(Json(AnalysisResponse {
        band: ScoreBand::from_score(analysis.truthfulness_percentage as f64),
        analysis,
    }))
}

pub async fn analyze_url_handler(
    AxumState(state): AppState,
    Json(payload): Json<UrlRequest>,
) -> Result<impl IntoResponse, AppError> {
    let analysis = state.oracle.score_url(&payload.url).await?;
    record_verification(&state, &analysis).await;

    Ok(Json(AnalysisResponse {
        band: ScoreBand::from_score(analysis.truthfulness_percentage as f64),
        analysis,
    }))
}

/// The caller already has its answer, so a failed write is only logged.
async fn record_verification(state: &State, analysis: &TextAnalysis) {
    if analysis.summary.trim().is_empty() {
        return;
    }

    let record = VerificationRecord::new(
        analysis.summary.clone(),
        analysis.truthfulness_percentage as f64,
    );

    match state.store.append_verification(record).await {
        Ok(()) => state.trending.nudge(),
        Err(e) => warn!("Failed to record verification: {e}"),
    }
}
