// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP surface: the public feed route, the request API and the background
//! polling loop that feeds claimed requests to the generation worker.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{FeedError, LifecycleError};
use crate::feed::{FeedSettings, generate_feed};
use crate::lifecycle::{RequestLifecycle, RunSummary};
use crate::model::{RequestDraft, ShowRequest};
use crate::store::SharedStore;
use crate::worker::SharedWorker;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub lifecycle: RequestLifecycle,
    pub feed: Arc<FeedSettings>,
}

impl AppState {
    pub fn new(lifecycle: RequestLifecycle, feed: FeedSettings) -> Self {
        Self {
            store: lifecycle.store().clone(),
            lifecycle,
            feed: Arc::new(feed),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/pod/{id}", get(show_feed))
        .route("/api/requests", post(submit_request))
        .route("/api/requests/{id}", get(get_request))
        .route("/api/requests/{id}/requeue", post(requeue_request))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn show_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let feed = generate_feed(state.store.as_ref(), &id, &state.feed).await?;
    Ok(([(header::CONTENT_TYPE, "application/xml")], feed.xml).into_response())
}

async fn submit_request(
    State(state): State<AppState>,
    Json(draft): Json<RequestDraft>,
) -> Result<(StatusCode, Json<ShowRequest>), ApiError> {
    let request = state.lifecycle.submit(draft).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShowRequest>, ApiError> {
    Ok(Json(state.lifecycle.get(&id).await?))
}

async fn requeue_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShowRequest>, ApiError> {
    Ok(Json(state.lifecycle.requeue(&id).await?))
}

/// An error rendered as `{"error": "..."}` with a matching status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        error!(%message, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::NotFound { .. } => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            FeedError::Store(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        let status = match err {
            LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
            LifecycleError::AlreadyClaimed { .. }
            | LifecycleError::LeaseLost { .. }
            | LifecycleError::NotRequeueable { .. }
            | LifecycleError::AttemptsExhausted { .. } => StatusCode::CONFLICT,
            LifecycleError::Store(_) => return Self::internal(err.to_string()),
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Run `run_pending` every poll interval until `shutdown` flips
pub fn spawn_poll_loop(
    lifecycle: RequestLifecycle,
    worker: SharedWorker,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(lifecycle.options().poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let limit = lifecycle.options().max_concurrent.max(1);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            match lifecycle.run_pending(worker.as_ref(), limit).await {
                Ok(summary) if summary != RunSummary::default() => {
                    info!(
                        reclaimed = summary.reclaimed,
                        published = summary.published,
                        failed = summary.failed,
                        aborted = summary.aborted,
                        "polling round finished"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "polling round failed"),
            }
        }

        info!("polling loop stopped");
    })
}

/// Serve the router on `listener` until Ctrl+C.
///
/// With a worker, also polls for queued requests; without one the server
/// only accepts and reports requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    worker: Option<SharedWorker>,
) -> std::io::Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let poller = worker.map(|worker| spawn_poll_loop(state.lifecycle.clone(), worker, stop_rx));

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, polling = poller.is_some(), "showfeed listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(true);
    if let Some(poller) = poller {
        if let Err(e) = poller.await {
            warn!(error = %e, "polling loop ended abnormally");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
