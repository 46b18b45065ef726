//! REST API for coordinator status and event control.
//!
//! Endpoints:
//! - `GET /status`: current status snapshot
//! - `GET /events`: scheduled and active events
//! - `POST /events`: deliver an event descriptor, answered `optIn`/`optOut`
//! - `DELETE /events/{id}`: cancel an event
//! - `PUT /opt-in`: set the opt-in decision
//! - `GET /history`: recorded snapshots with optional time range

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, put};
use log::info;
use tokio::sync::Mutex;

use crate::dr::{Coordinator, OverrideErrorFlag, Scheduler};
use crate::reporting::StatusHistory;

pub use types::{
    CancelResponse, DescriptorRequest, ErrorResponse, HistoryQuery, IntervalRequest,
    OptInRequest, OptInResponse, SubmitResponse,
};

/// Handles shared across all request handlers.
pub struct AppState {
    pub scheduler: Scheduler,
    pub error_flag: OverrideErrorFlag,
    pub history: Arc<Mutex<StatusHistory>>,
}

impl AppState {
    pub fn from_coordinator(coordinator: &Coordinator) -> Arc<Self> {
        Arc::new(Self {
            scheduler: coordinator.scheduler().clone(),
            error_flag: coordinator.error_flag().clone(),
            history: coordinator.history(),
        })
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/events", get(handlers::get_events).post(handlers::post_event))
        .route("/events/{id}", delete(handlers::delete_event))
        .route("/opt-in", put(handlers::put_opt_in))
        .route("/history", get(handlers::get_history))
        .with_state(state)
}

/// Binds to the given address and serves the API until the task is dropped.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{addr}");
    axum::serve(listener, app).await
}
