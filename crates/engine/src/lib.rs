//! Bloodbond Engine - server-side session coordination.
//!
//! Exposed as a library so integration tests can drive the handlers
//! without a socket; `main.rs` wires the same pieces to axum.

pub mod api;
pub mod app;
pub mod replication;
pub mod rooms;

pub use app::App;
