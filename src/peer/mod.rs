//! Peer connection handles and the factory that builds them.

pub mod rtc;

use crate::error::Result;
use crate::media::LocalMedia;
use crate::signaling::{IceCandidate, SessionDescription};
use crate::sink::RemoteTrack;
use crate::types::ParticipantId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

pub use rtc::{RtcConnectionFactory, RtcPeerConnection};

/// Link state reported by the connectivity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::New,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::New => write!(f, "New"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Failed => write!(f, "Failed"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Something a peer connection handle reports on its own.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local connectivity candidate to forward to the remote side.
    Candidate(IceCandidate),
    /// A remote media track arrived.
    Track(RemoteTrack),
    State(ConnectionState),
}

/// Event stream of one handle. Ends when the handle is closed.
pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// The negotiated link with one remote participant.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Creates an offer and commits it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Commits `offer` as the remote description, then creates and commits
    /// the answer.
    async fn create_answer(&self, offer: SessionDescription) -> Result<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Marks the next offer as an ICE restart.
    async fn restart_ice(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds peer connection handles with all local tracks attached.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(
        &self,
        peer: &ParticipantId,
        local: &LocalMedia,
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents)>;
}
