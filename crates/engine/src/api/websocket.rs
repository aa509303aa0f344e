//! WebSocket handling for Host and Player connections.
//!
//! One bounded channel per connection; a forward task drains it onto
//! the socket while this module parses inbound frames and dispatches
//! them through a single typed router, so every mutation path is
//! enumerable and testable without a socket.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use bloodbond_domain::{ConnectionId, DomainError, RoomId, SeatId};
use bloodbond_shared::{ClientMessage, PlayerAction, ServerMessage};

use super::connections::SeatBinding;
use crate::app::App;

/// Buffer size for per-connection message channel.
const CONNECTION_CHANNEL_BUFFER: usize = 256;

/// WebSocket upgrade handler - entry point for new connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<Arc<App>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, app: Arc<App>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let connection_id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CONNECTION_CHANNEL_BUFFER);
    app.connections.register(connection_id, tx.clone()).await;

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Forward outbound messages from the channel to the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    if let Some(response) = handle_message(&app, connection_id, msg).await {
                        if tx.try_send(response).is_err() {
                            tracing::warn!(
                                connection_id = %connection_id,
                                "Failed to send response, channel full or closed"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %connection_id, error = %e, "Failed to parse message");
                    let error = ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    };
                    let _ = tx.try_send(error);
                }
            },
            Ok(Message::Ping(_)) => {
                let _ = tx.try_send(ServerMessage::Pong);
            }
            Ok(Message::Close(_)) => {
                tracing::info!(connection_id = %connection_id, "WebSocket closed by client");
                break;
            }
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Clean up: presence broadcasts first, then drop the binding.
    handle_disconnect(&app, connection_id).await;
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket connection terminated");
}

/// Dispatch a parsed client message. Returns the private reply for the
/// sending connection, if any; broadcasts happen inside the handlers.
pub async fn handle_message(
    app: &App,
    connection_id: ConnectionId,
    msg: ClientMessage,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::Ping => Some(ServerMessage::Pong),

        ClientMessage::Join { room_id, seat_id } => {
            handle_join(app, connection_id, room_id, seat_id).await
        }

        ClientMessage::ReplaceState {
            room_id,
            identities,
        } => app
            .replicator
            .replace_state(connection_id, &room_id, identities)
            .await
            .err()
            .map(error_event),

        ClientMessage::Action {
            room_id,
            seat_id,
            action,
        } => handle_action(app, &room_id, seat_id, action).await,
    }
}

async fn handle_action(
    app: &App,
    room_id: &RoomId,
    seat_id: SeatId,
    action: PlayerAction,
) -> Option<ServerMessage> {
    let result = match action {
        PlayerAction::AppendReveal { reveal } => {
            app.replicator.append_reveal(room_id, seat_id, reveal).await
        }
        PlayerAction::UpdateDisplayName { name } => {
            app.replicator
                .update_display_name(room_id, seat_id, name)
                .await
        }
        PlayerAction::DistributeSecretCards { allocations } => {
            app.replicator
                .distribute_secret_cards(room_id, seat_id, allocations)
                .await
        }
    };
    result.err().map(error_event)
}

/// Bind a connection to a (room, seat) pair and bring it up to date.
///
/// The host binding (wire seat 0) subscribes to the room without
/// occupying a seat: it gets the private snapshot but triggers no
/// joined/presence broadcast. Player joins are idempotent - a
/// reconnecting seat simply replaces its connection handle.
async fn handle_join(
    app: &App,
    connection_id: ConnectionId,
    room_id: RoomId,
    seat_id: u8,
) -> Option<ServerMessage> {
    let binding = SeatBinding::from_wire(seat_id);

    if let SeatBinding::Player(seat) = binding {
        let joined = app.rooms.with_room(&room_id, |room| {
            if room.identity(seat).is_none() {
                return Err(DomainError::SeatNotFound(seat.value()));
            }
            room.set_presence(seat, true, Utc::now())?;
            Ok(room.connected_seat_ids())
        });
        let connected_seat_ids = match joined {
            Ok(seats) => seats,
            Err(e) => return Some(error_event(e)),
        };

        app.connections
            .bind(connection_id, room_id.clone(), binding)
            .await;
        app.connections
            .broadcast_to_room_except(
                &room_id,
                connection_id,
                ServerMessage::SeatJoined {
                    seat_id: seat,
                    connected_seat_ids: connected_seat_ids.clone(),
                },
            )
            .await;
        app.connections
            .broadcast_to_room_except(
                &room_id,
                connection_id,
                ServerMessage::PresenceChanged {
                    seat_id: seat,
                    is_online: true,
                },
            )
            .await;
    } else {
        if !app.rooms.contains(&room_id) {
            return Some(error_event(DomainError::not_found(room_id.as_str())));
        }
        app.connections
            .bind(connection_id, room_id.clone(), binding)
            .await;
    }

    // Private snapshot to the joining connection only.
    match app.rooms.snapshot(&room_id) {
        Ok(room) => Some(ServerMessage::Snapshot {
            room_id: room.id.clone(),
            declared_count: room.declared_count,
            connected_seat_ids: room.connected_seat_ids(),
            phase: room.phase,
            identities: room.identities,
        }),
        Err(e) => Some(error_event(e)),
    }
}

/// Best-effort cleanup for a departing connection. A room that has
/// already expired only gets a log line - a disconnect must never
/// crash the gateway.
pub async fn handle_disconnect(app: &App, connection_id: ConnectionId) {
    if let Some(info) = app.connections.get(connection_id).await {
        if let (Some(room_id), Some(binding)) = (info.room_id, info.binding) {
            match binding.player_seat() {
                Some(seat) => {
                    let left = app.rooms.with_room(&room_id, |room| {
                        room.set_presence(seat, false, Utc::now())?;
                        Ok(room.connected_seat_ids())
                    });
                    match left {
                        Ok(connected_seat_ids) => {
                            app.connections
                                .broadcast_to_room_except(
                                    &room_id,
                                    connection_id,
                                    ServerMessage::SeatLeft {
                                        seat_id: seat,
                                        connected_seat_ids,
                                    },
                                )
                                .await;
                            app.connections
                                .broadcast_to_room_except(
                                    &room_id,
                                    connection_id,
                                    ServerMessage::PresenceChanged {
                                        seat_id: seat,
                                        is_online: false,
                                    },
                                )
                                .await;
                            tracing::info!(room_id = %room_id, seat_id = %seat, "Seat left room");
                        }
                        Err(e) => {
                            tracing::debug!(
                                room_id = %room_id,
                                error = %e,
                                "Departing connection's room already gone"
                            );
                        }
                    }
                }
                // Presence broadcasts are suppressed for the host.
                None => tracing::info!(room_id = %room_id, "Host connection left room"),
            }
        }
    }
    app.connections.unregister(connection_id).await;
}

fn error_event(e: DomainError) -> ServerMessage {
    ServerMessage::Error {
        message: e.to_string(),
    }
}
