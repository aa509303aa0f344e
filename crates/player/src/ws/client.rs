//! WebSocket client for the Engine, using tokio-tungstenite.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use bloodbond_domain::RoomId;
use bloodbond_shared::{ClientMessage, ServerMessage};

use crate::state::{ConnectionStatus, ViewerSeat};
use crate::ws::backoff::{BackoffState, MAX_RETRY_ATTEMPTS};

/// WebSocket client for communicating with the Engine.
///
/// Owns the socket lifecycle, including reconnection with exponential
/// backoff, and replays the last join after every successful reconnect
/// so the engine rebinds the seat to the new connection.
pub struct EngineClient {
    url: String,
    status: Arc<RwLock<ConnectionStatus>>,
    tx: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    on_message: Arc<Mutex<Option<Box<dyn Fn(ServerMessage) + Send + Sync>>>>,
    on_status_change: Arc<Mutex<Option<Box<dyn Fn(ConnectionStatus) + Send + Sync>>>>,
    /// Join to replay on every (re)connect.
    rejoin: Arc<RwLock<Option<ClientMessage>>>,
    /// Flag to track if disconnect was intentional (vs unexpected close)
    intentional_disconnect: Arc<RwLock<bool>>,
}

impl EngineClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            tx: Arc::new(Mutex::new(None)),
            on_message: Arc::new(Mutex::new(None)),
            on_status_change: Arc::new(Mutex::new(None)),
            rejoin: Arc::new(RwLock::new(None)),
            intentional_disconnect: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn set_on_message<F>(&self, callback: F)
    where
        F: Fn(ServerMessage) + Send + Sync + 'static,
    {
        let mut on_message = self.on_message.lock().await;
        *on_message = Some(Box::new(callback));
    }

    pub async fn set_on_status_change<F>(&self, callback: F)
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let mut on_status_change = self.on_status_change.lock().await;
        *on_status_change = Some(Box::new(callback));
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    async fn set_status(&self, new_status: ConnectionStatus) {
        {
            let mut status = self.status.write().await;
            *status = new_status;
        }

        let callback = self.on_status_change.lock().await;
        if let Some(ref cb) = *callback {
            cb(new_status);
        }
    }

    /// Record the (room, seat) pair to join on connect and after every
    /// reconnect.
    pub async fn set_session(&self, room_id: RoomId, viewer: ViewerSeat) {
        let mut rejoin = self.rejoin.write().await;
        *rejoin = Some(ClientMessage::Join {
            room_id,
            seat_id: viewer.wire_seat_id(),
        });
    }

    /// Internal connect logic - returns whether connection closed unexpectedly
    async fn connect_internal(&self) -> Result<bool> {
        self.set_status(ConnectionStatus::Connecting).await;

        match connect_async(&self.url).await {
            Ok((ws_stream, _)) => {
                tracing::info!("Connected to Engine at {}", self.url);
                self.set_status(ConnectionStatus::Connected).await;

                let (mut write, mut read) = ws_stream.split();

                let (tx, mut rx) = mpsc::channel::<ClientMessage>(32);
                {
                    let mut tx_lock = self.tx.lock().await;
                    *tx_lock = Some(tx.clone());
                }

                // Replay the join so the engine rebinds this seat.
                if let Some(join) = self.rejoin.read().await.clone() {
                    let _ = tx.send(join).await;
                }

                let on_message = Arc::clone(&self.on_message);
                let status = Arc::clone(&self.status);
                let on_status_change = Arc::clone(&self.on_status_change);
                let intentional_disconnect = Arc::clone(&self.intentional_disconnect);

                let read_handle = tokio::spawn(async move {
                    let mut unexpected_close = false;
                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(server_msg) => {
                                        let callback = on_message.lock().await;
                                        if let Some(ref cb) = *callback {
                                            cb(server_msg);
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!("Failed to parse server message: {}", e);
                                    }
                                }
                            }
                            Ok(Message::Close(_)) => {
                                tracing::info!("Server closed connection");
                                let intentional = *intentional_disconnect.read().await;
                                unexpected_close = !intentional;
                                break;
                            }
                            Ok(Message::Ping(_data)) => {}
                            Err(e) => {
                                tracing::error!("WebSocket error: {}", e);
                                unexpected_close = true;
                                break;
                            }
                            _ => {}
                        }
                    }

                    {
                        let mut s = status.write().await;
                        *s = ConnectionStatus::Disconnected;
                    }
                    {
                        let callback = on_status_change.lock().await;
                        if let Some(ref cb) = *callback {
                            cb(ConnectionStatus::Disconnected);
                        }
                    }

                    unexpected_close
                });

                let write_handle = tokio::spawn(async move {
                    while let Some(msg) = rx.recv().await {
                        let json = match serde_json::to_string(&msg) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize WebSocket message: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(json)).await {
                            tracing::error!("Failed to send message: {}", e);
                            break;
                        }
                    }
                });

                let unexpected_close = tokio::select! {
                    result = read_handle => {
                        tracing::info!("Read task completed");
                        result.unwrap_or(false)
                    }
                    _ = write_handle => {
                        tracing::info!("Write task completed");
                        // Write task ended first - likely a disconnect
                        true
                    }
                };

                Ok(unexpected_close)
            }
            Err(e) => {
                tracing::error!("Failed to connect to Engine: {}", e);
                self.set_status(ConnectionStatus::Failed).await;
                Err(e.into())
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    async fn reconnect_with_backoff(&self) {
        let mut backoff = BackoffState::default();

        loop {
            self.set_status(ConnectionStatus::Reconnecting).await;
            let Some(delay) = backoff.next_delay_and_advance() else {
                tracing::error!("Max reconnection attempts reached, giving up");
                self.set_status(ConnectionStatus::Failed).await;
                return;
            };
            tracing::info!(
                "Reconnection attempt {} of {}, waiting {}ms",
                backoff.attempts(),
                MAX_RETRY_ATTEMPTS,
                delay
            );

            tokio::time::sleep(Duration::from_millis(delay)).await;

            // Check if disconnect was requested during the wait
            if *self.intentional_disconnect.read().await {
                tracing::info!("Reconnection cancelled - intentional disconnect");
                self.set_status(ConnectionStatus::Disconnected).await;
                return;
            }

            match self.connect_internal().await {
                Ok(unexpected_close) => {
                    if unexpected_close && !*self.intentional_disconnect.read().await {
                        // A successful session ran and then dropped; start
                        // the schedule over rather than resuming mid-way.
                        backoff.reset();
                        continue;
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!("Reconnection attempt {} failed: {}", backoff.attempts(), e);
                }
            }
        }
    }

    /// Connect and stay connected until the session ends. Returns once
    /// the connection is closed for good (intentionally or after the
    /// retry budget is spent).
    pub async fn connect(&self) -> Result<()> {
        {
            let mut flag = self.intentional_disconnect.write().await;
            *flag = false;
        }

        match self.connect_internal().await {
            Ok(unexpected_close) => {
                if unexpected_close && !*self.intentional_disconnect.read().await {
                    tracing::info!("Connection closed unexpectedly, initiating reconnection");
                    self.reconnect_with_backoff().await;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        // Clone the sender to avoid holding the lock across await
        let tx = {
            let tx_lock = self.tx.lock().await;
            tx_lock.clone()
        };
        if let Some(tx) = tx {
            tx.send(message).await?;
            Ok(())
        } else {
            Err(anyhow::anyhow!("Not connected"))
        }
    }

    pub async fn disconnect(&self) {
        // Mark this as intentional to prevent reconnection attempts
        {
            let mut flag = self.intentional_disconnect.write().await;
            *flag = true;
        }
        {
            let mut tx_lock = self.tx.lock().await;
            *tx_lock = None;
        }
        self.set_status(ConnectionStatus::Disconnected).await;
    }
}

impl Clone for EngineClient {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            status: Arc::clone(&self.status),
            tx: Arc::clone(&self.tx),
            on_message: Arc::clone(&self.on_message),
            on_status_change: Arc::clone(&self.on_status_change),
            rejoin: Arc::clone(&self.rejoin),
            intentional_disconnect: Arc::clone(&self.intentional_disconnect),
        }
    }
}
