//! Bloodbond Player - client-side session replica.
//!
//! Keeps a local mirror of one room converged with the Engine over a
//! reconnecting WebSocket, with HTTP for room setup and cold-start
//! resume. Rendering layers sit on top of [`state::ReplicaState`].

pub mod api;
pub mod replica;
pub mod state;
pub mod ws;

pub use api::ApiClient;
pub use replica::{SessionReplica, SessionStore, StoredSession};
pub use state::{ConnectionStatus, ReplicaState, ViewerSeat};
pub use ws::EngineClient;
