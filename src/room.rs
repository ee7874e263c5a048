//! Client for the room-membership API.

use crate::error::{Error, Result};
use crate::types::{ParticipantId, RoomId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Serialize)]
struct JoinRequest<'a> {
    room_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl JoinResponse {
    pub fn is_ok(&self) -> bool {
        self.message == "OK"
    }
}

/// Room membership. Joining must succeed before any signaling starts.
#[async_trait]
pub trait RoomApi: Send + Sync {
    async fn join(&self, room: &RoomId, user: &ParticipantId) -> Result<()>;
}

pub struct HttpRoomApi {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRoomApi {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait]
impl RoomApi for HttpRoomApi {
    async fn join(&self, room: &RoomId, user: &ParticipantId) -> Result<()> {
        let request = JoinRequest {
            room_id: room.as_str(),
            user_id: user.as_str(),
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(%room, %user, %status, "join response");

        // Rejections come back as non-2xx with a JSON error body, or with no
        // body at all for malformed requests.
        let parsed: JoinResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(Error::JoinRejected(format!("server responded with {}", status)));
            }
        };
        if !parsed.is_ok() {
            let reason = parsed
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| format!("server responded with {}", status));
            return Err(Error::JoinRejected(reason));
        }

        info!(%room, %user, "successfully joined the room");
        Ok(())
    }
}
