//! HTTP client for the Engine's room endpoints.

use thiserror::Error;

use bloodbond_domain::RoomId;
use bloodbond_shared::{
    CreateRoomRequest, CreateRoomResponse, HealthResponse, RoomSummary, StartResponse,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("engine returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Thin typed wrapper over the Engine's HTTP surface.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn create_room(&self, player_count: u8) -> Result<CreateRoomResponse, ApiError> {
        let response = self
            .http
            .post(format!("{}/api/rooms", self.base_url))
            .json(&CreateRoomRequest { player_count })
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn room_summary(&self, room_id: &RoomId) -> Result<RoomSummary, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/rooms/{}", self.base_url, room_id))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Start the session (idempotent on the engine side) and fetch the
    /// authoritative identity list.
    pub async fn start(&self, room_id: &RoomId) -> Result<StartResponse, ApiError> {
        let response = self
            .http
            .post(format!("{}/api/rooms/{}/start", self.base_url, room_id))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn restart(&self, room_id: &RoomId) -> Result<StartResponse, ApiError> {
        let response = self
            .http
            .post(format!("{}/api/rooms/{}/restart", self.base_url, room_id))
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/health", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}
