//! HTTP routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;

use bloodbond_domain::{DomainError, Phase, RoomId};
use bloodbond_shared::{
    CreateRoomRequest, CreateRoomResponse, HealthResponse, RoomSummary, ServerMessage,
    StartResponse,
};

use crate::app::App;
use crate::rooms::arm_expiry_timer;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/rooms", post(create_room))
        .route("/api/rooms/{id}", get(get_room))
        .route("/api/rooms/{id}/start", post(start_room))
        .route("/api/rooms/{id}/restart", post(restart_room))
}

async fn health(State(app): State<Arc<App>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_room_count: app.rooms.len(),
        active_connection_count: app.connections.count().await,
        uptime_seconds: (Utc::now() - app.started_at).num_seconds(),
    })
}

async fn create_room(
    State(app): State<Arc<App>>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    let room_id = app.rooms.create(request.player_count)?;
    arm_expiry_timer(app.rooms.clone(), room_id.clone());
    Ok(Json(CreateRoomResponse { room_id }))
}

async fn get_room(
    State(app): State<Arc<App>>,
    Path(id): Path<RoomId>,
) -> Result<Json<RoomSummary>, ApiError> {
    let room = app.rooms.snapshot(&id)?;
    // Identities stay private until the host has started the session.
    let identities = match room.phase {
        Phase::Waiting => None,
        Phase::Playing | Phase::Ended => Some(room.identities),
    };
    Ok(Json(RoomSummary {
        room_id: room.id,
        declared_count: room.declared_count,
        connected_seat_ids: room.connected_seats.iter().copied().collect(),
        phase: room.phase,
        identities,
    }))
}

/// Move the room to `Playing` and return the authoritative identity
/// list. Idempotent: calling it again re-fetches the same session.
async fn start_room(
    State(app): State<Arc<App>>,
    Path(id): Path<RoomId>,
) -> Result<Json<StartResponse>, ApiError> {
    let room = app.rooms.with_room(&id, |room| {
        room.start(Utc::now());
        Ok(room.clone())
    })?;
    app.connections
        .broadcast_to_room(
            &id,
            ServerMessage::StateUpdated {
                phase: room.phase,
                identities: room.identities.clone(),
            },
        )
        .await;
    Ok(Json(StartResponse {
        room_id: room.id,
        phase: room.phase,
        identities: room.identities,
    }))
}

/// Redraw identities in place, keeping seat display names.
async fn restart_room(
    State(app): State<Arc<App>>,
    Path(id): Path<RoomId>,
) -> Result<Json<StartResponse>, ApiError> {
    let room = app.replicator.restart(&id).await?;
    Ok(Json(StartResponse {
        room_id: room.id,
        phase: room.phase,
        identities: room.identities,
    }))
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (axum::http::StatusCode::NOT_FOUND, "Not found").into_response()
            }
            ApiError::BadRequest(msg) => {
                (axum::http::StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Internal(_) => (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
            )
                .into_response(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound(_) => ApiError::NotFound,
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
