use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use webrtc::Error as WebRTCError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unable to join room: {0}")]
    JoinRejected(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("negotiation failed: {0}")]
    Negotiation(#[from] WebRTCError),

    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
