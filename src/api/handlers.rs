//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};

use crate::dr::{CancelOutcome, EventDescriptor, ScheduledEventView, StatusSnapshot};

use super::AppState;
use super::types::{
    CancelResponse, DescriptorRequest, ErrorResponse, HistoryQuery, OptInRequest, OptInResponse,
    SubmitResponse,
};

/// `GET /status` → 200 + `StatusSnapshot` JSON
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    let now = state.scheduler.clock().now();
    let snapshot = state
        .scheduler
        .shared()
        .lock()
        .await
        .snapshot(now, state.error_flag.get());
    Json(snapshot)
}

/// `GET /events` → 200 + events ordered by start
pub async fn get_events(State(state): State<Arc<AppState>>) -> Json<Vec<ScheduledEventView>> {
    Json(state.scheduler.shared().lock().await.scheduled_events())
}

/// Delivers a descriptor to the scheduler as the event source would.
///
/// `POST /events` → 200 + `{"event_id", "decision": "optIn" | "optOut"}`
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DescriptorRequest>,
) -> Json<SubmitResponse> {
    let descriptor = EventDescriptor::from(request);
    let decision = state.scheduler.handle_event(&descriptor).await;
    Json(SubmitResponse {
        event_id: descriptor.event_id,
        decision,
    })
}

/// `DELETE /events/{id}` → 200 + `CancelResponse`, or 404 for unknown ids
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.scheduler.cancel(&id).await {
        CancelOutcome::Unknown => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no event \"{id}\""),
            }),
        )),
        outcome => Ok(Json(CancelResponse {
            event_id: id,
            outcome,
        })),
    }
}

/// `PUT /opt-in` with `{"opt_in": bool}` → 200 + the new value
pub async fn put_opt_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OptInRequest>,
) -> Json<OptInResponse> {
    state.scheduler.set_opt_in(request.opt_in).await;
    Json(OptInResponse {
        opt_in: request.opt_in,
    })
}

/// Returns recorded snapshots, optionally filtered by time.
///
/// `GET /history` → 200 + all snapshots
/// `GET /history?from=..&to=..` → inclusive range
/// `from` later than `to` → 400 + `ErrorResponse`
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to = query.to.unwrap_or(DateTime::<Utc>::MAX_UTC);

    if from > to {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("`from` ({from}) must be <= `to` ({to})"),
            }),
        ));
    }

    Ok(Json(state.history.lock().await.between(from, to)))
}
