//! Relay signaling: wire messages and the transport that carries them.

pub mod message;
pub mod transport;

pub use message::{
    Announcement, AnnouncementKind, IceCandidate, OutboundMessage, SdpKind, SessionDescription,
    SignalKind,
};
pub use transport::{AnnouncementStream, Transport, WsTransport};
