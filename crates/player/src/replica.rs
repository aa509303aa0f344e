//! Session lifecycle: join, resume after a cold start, heartbeat.
//!
//! The replica ties the HTTP client, the live channel and the local
//! mirror together. A stored (room, seat) pair survives process
//! restarts through the [`SessionStore`]; on resume the room is
//! re-fetched over HTTP before the live channel rejoins it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};

use bloodbond_domain::{RevealKind, RoomId, SeatId};
use bloodbond_shared::{AllocationMap, ClientMessage, PlayerAction, ServerMessage};

use crate::api::{ApiClient, ApiError};
use crate::state::{ConnectionStatus, ReplicaState, ViewerSeat};
use crate::ws::EngineClient;

pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 60;
pub const HEALTH_POLL_INTERVAL_SECS: u64 = 30;

/// The (room, seat) pair a replica can rejoin after a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub room_id: RoomId,
    pub viewer: ViewerSeat,
}

/// Where the stored session lives between process runs.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<StoredSession>;
    fn save(&self, session: &StoredSession);
    fn clear(&self);
}

/// Keeps the session for the lifetime of the process only. Useful in
/// tests and as the fallback when no platform storage is wired up.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<StoredSession>>,
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<StoredSession> {
        self.inner.lock().ok()?.clone()
    }

    fn save(&self, session: &StoredSession) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(session.clone());
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = None;
        }
    }
}

/// A stale channel: no pong has arrived within the timeout window.
pub fn heartbeat_stale(last_pong: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - last_pong).num_seconds() > HEARTBEAT_TIMEOUT_SECS
}

/// What one heartbeat tick should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeartbeatTick {
    /// Client not connected; nothing to ping.
    Idle,
    /// Fresh connection (or reconnect): restart the pong clock before
    /// pinging so the old gap is not counted against the new socket.
    ResetAndPing,
    /// Pong gap past the timeout: surface the failure but keep
    /// pinging, so a late pong can still recover the channel.
    MarkFailedAndPing,
    Ping,
}

fn heartbeat_tick(
    previous: ConnectionStatus,
    current: ConnectionStatus,
    last_pong: DateTime<Utc>,
    now: DateTime<Utc>,
) -> HeartbeatTick {
    if current != ConnectionStatus::Connected {
        return HeartbeatTick::Idle;
    }
    if previous != ConnectionStatus::Connected {
        return HeartbeatTick::ResetAndPing;
    }
    if heartbeat_stale(last_pong, now) {
        return HeartbeatTick::MarkFailedAndPing;
    }
    HeartbeatTick::Ping
}

/// One player's (or the host's) live view of a session.
pub struct SessionReplica {
    state: Arc<Mutex<ReplicaState>>,
    client: EngineClient,
    api: ApiClient,
    store: Arc<dyn SessionStore>,
    last_pong: Arc<Mutex<DateTime<Utc>>>,
}

impl SessionReplica {
    pub fn new(api: ApiClient, client: EngineClient, store: Arc<dyn SessionStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReplicaState::default())),
            client,
            api,
            store,
            last_pong: Arc::new(Mutex::new(Utc::now())),
        }
    }

    /// Point-in-time copy of the mirror.
    pub fn state(&self) -> ReplicaState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Join a room and keep the mirror converged until disconnect.
    /// Persists the session so a process restart can [`Self::resume`].
    pub async fn join(&self, room_id: RoomId, viewer: ViewerSeat) -> Result<()> {
        self.store.save(&StoredSession {
            room_id: room_id.clone(),
            viewer,
        });
        if let Ok(mut state) = self.state.lock() {
            state.bind(room_id.clone(), viewer);
        }

        self.wire_callbacks().await;
        self.client.set_session(room_id, viewer).await;

        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.connect().await {
                tracing::error!("Engine connection failed: {}", e);
            }
        });
        Ok(())
    }

    /// Rejoin the session stored by a previous run. Returns `false`
    /// when there is nothing to resume or the room has since expired;
    /// an expired session is cleared so the next launch starts clean.
    pub async fn resume(&self) -> Result<bool> {
        let Some(session) = self.store.load() else {
            return Ok(false);
        };

        match self.api.room_summary(&session.room_id).await {
            Ok(summary) => {
                if let Ok(mut state) = self.state.lock() {
                    state.bind(session.room_id.clone(), session.viewer);
                    state.declared_count = Some(summary.declared_count);
                    state.phase = Some(summary.phase);
                    if let Some(identities) = summary.identities {
                        state.identities = identities;
                    }
                }
                self.join(session.room_id, session.viewer).await?;
                Ok(true)
            }
            Err(ApiError::Status { status, .. })
                if status == reqwest::StatusCode::NOT_FOUND =>
            {
                tracing::info!(room_id = %session.room_id, "Stored session expired, clearing");
                self.store.clear();
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Leave the session for good: no reconnect, no resume.
    pub async fn leave(&self) {
        self.store.clear();
        self.client.disconnect().await;
        if let Ok(mut state) = self.state.lock() {
            state.reset();
        }
    }

    pub async fn append_reveal(&self, reveal: RevealKind) -> Result<()> {
        let (room_id, seat_id) = self.own_seat()?;
        self.client
            .send(ClientMessage::Action {
                room_id,
                seat_id,
                action: PlayerAction::AppendReveal { reveal },
            })
            .await
    }

    pub async fn update_display_name(&self, name: String) -> Result<()> {
        let (room_id, seat_id) = self.own_seat()?;
        self.client
            .send(ClientMessage::Action {
                room_id,
                seat_id,
                action: PlayerAction::UpdateDisplayName { name },
            })
            .await
    }

    /// The neutral seat's one-shot allocation.
    pub async fn distribute_secret_cards(&self, allocations: AllocationMap) -> Result<()> {
        let (room_id, seat_id) = self.own_seat()?;
        self.client
            .send(ClientMessage::Action {
                room_id,
                seat_id,
                action: PlayerAction::DistributeSecretCards { allocations },
            })
            .await
    }

    /// Spawn the ping loop. A pong gap past the timeout marks the
    /// connection failed; pings keep flowing regardless, and the pong
    /// clock restarts on every reconnect, so the failure clears as
    /// soon as the engine answers again.
    pub fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        let last_pong = Arc::clone(&self.last_pong);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
            let mut previous = ConnectionStatus::Disconnected;
            loop {
                ticker.tick().await;
                let current = client.status().await;
                let now = Utc::now();
                let last = last_pong.lock().map(|t| *t).unwrap_or(now);
                match heartbeat_tick(previous, current, last, now) {
                    HeartbeatTick::Idle => {}
                    HeartbeatTick::ResetAndPing => {
                        if let Ok(mut t) = last_pong.lock() {
                            *t = now;
                        }
                        if let Err(e) = client.send(ClientMessage::Ping).await {
                            tracing::debug!("Heartbeat send failed: {}", e);
                        }
                    }
                    HeartbeatTick::MarkFailedAndPing => {
                        tracing::warn!("Heartbeat timed out, marking connection failed");
                        if let Ok(mut s) = state.lock() {
                            s.set_connection(ConnectionStatus::Failed);
                        }
                        if let Err(e) = client.send(ClientMessage::Ping).await {
                            tracing::debug!("Heartbeat send failed: {}", e);
                        }
                    }
                    HeartbeatTick::Ping => {
                        if let Err(e) = client.send(ClientMessage::Ping).await {
                            tracing::debug!("Heartbeat send failed: {}", e);
                        }
                    }
                }
                previous = current;
            }
        })
    }

    /// Spawn the background engine health poll. Failures only log; the
    /// live channel's own status drives the UI.
    pub fn spawn_health_poll(&self) -> tokio::task::JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(HEALTH_POLL_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                match api.health().await {
                    Ok(report) => tracing::debug!(
                        rooms = report.active_room_count,
                        connections = report.active_connection_count,
                        "Engine healthy"
                    ),
                    Err(e) => tracing::warn!("Engine health check failed: {}", e),
                }
            }
        })
    }

    fn own_seat(&self) -> Result<(RoomId, SeatId)> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("replica state poisoned"))?;
        let room_id = state
            .room_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("not in a room"))?;
        match state.viewer {
            Some(ViewerSeat::Player(seat)) => Ok((room_id, seat)),
            _ => Err(anyhow::anyhow!("viewer holds no player seat")),
        }
    }

    async fn wire_callbacks(&self) {
        let state = Arc::clone(&self.state);
        let last_pong = Arc::clone(&self.last_pong);
        self.client
            .set_on_message(move |msg| {
                if matches!(msg, ServerMessage::Pong) {
                    if let Ok(mut t) = last_pong.lock() {
                        *t = Utc::now();
                    }
                    // A late pong clears a heartbeat-declared failure.
                    if let Ok(mut s) = state.lock() {
                        if s.connection == ConnectionStatus::Failed {
                            s.set_connection(ConnectionStatus::Connected);
                        }
                    }
                    return;
                }
                if let Ok(mut s) = state.lock() {
                    s.apply(msg);
                }
            })
            .await;

        let state = Arc::clone(&self.state);
        self.client
            .set_on_status_change(move |status| {
                if let Ok(mut s) = state.lock() {
                    s.set_connection(status);
                }
            })
            .await;
    }
}
