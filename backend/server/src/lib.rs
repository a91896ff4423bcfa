//! # Server
//!
//! HTTP backend for community news verification.
//!
//! ## Routes
//!
//! - `GET /submissions`: every submission, newest first, joined with its author and a vote summary
//! - `POST /submissions`: post a story, signed in users only
//! - `POST /submissions/{id}/vote`: `{"direction": "up" | "down"}`, toggles the caller's vote
//! - `GET /trending`: latest trending snapshot, optional `limit`
//! - `GET /leaderboard`: users by points
//! - `POST /analyze/text`, `/analyze/image`, `/analyze/url`: truthfulness scoring
//!
//! ## Verification
//!
//! Sign in happens in front of this service. The auth layer forwards the user id in `X-User-Id`.
//! Without it, votes and new submissions are rejected before anything touches Redis.
//!
//! ## Notes
//!
//! - Redis holds everything, see [`database`] for the key layout
//! - Trending is recomputed in the background and served from memory, see [`feed`]
//! - The oracle can be down without affecting votes or trending
use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use signal::ctrl_c;
#[cfg(unix)]
use signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod feed;
pub mod oracle;
pub mod routes;
pub mod state;
pub mod utils;

use routes::{
    analyze_image_handler, analyze_text_handler, analyze_url_handler, create_submission_handler,
    health_handler, leaderboard_handler, submissions_handler, trending_handler, vote_handler,
};
use state::State;

/// Room for a base64 data URI of the largest accepted image, plus the JSON around it.
pub const IMAGE_BODY_LIMIT: usize = oracle::MAX_IMAGE_BYTES.div_ceil(3) * 4 + 64 * 1024;

pub fn app(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, utils::USER_HEADER])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/submissions",
            get(submissions_handler).post(create_submission_handler),
        )
        .route("/submissions/{id}/vote", post(vote_handler))
        .route("/trending", get(trending_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/analyze/text", post(analyze_text_handler))
        .route(
            "/analyze/image",
            post(analyze_image_handler).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/analyze/url", post(analyze_url_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let app = app(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
