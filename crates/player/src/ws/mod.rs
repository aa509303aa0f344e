//! Live channel to the Engine.

pub mod backoff;
pub mod client;

pub use backoff::BackoffState;
pub use client::EngineClient;
