//! Peer-to-peer audio/video calls coordinated over a relay signaling channel.
//!
//! A [`Session`] owns one participant's membership in one room. Inbound
//! announcements from the relay ("joined", "left", "offer", "answer",
//! "candidate") are routed per remote participant to the
//! [`SignalingController`], which keeps one peer connection per participant
//! in its [`PeerRegistry`] and answers with offers, answers and candidates.

pub mod call;
pub mod config;
pub mod controller;
pub mod error;
pub mod media;
pub mod peer;
pub mod presentation;
pub mod registry;
pub mod room;
pub mod session;
pub mod signaling;
pub mod sink;
pub mod types;

pub use call::{start_call, CallParams, CallServices};
pub use controller::{Dispatcher, MediaContext, SignalingController};
pub use error::{Error, Result};
pub use media::{LocalMedia, LocalTrack, MediaConstraints, MediaSource, SyntheticMediaSource, TrackKind};
pub use peer::{ConnectionFactory, PeerConnection, PeerEvent, PeerEvents, RtcConnectionFactory};
pub use presentation::{Presentation, ViewMonitor, ViewState};
pub use registry::{PeerRegistry, PeerState};
pub use room::{HttpRoomApi, RoomApi};
pub use session::{Session, SessionParams};
pub use signaling::{Announcement, AnnouncementKind, OutboundMessage, Transport, WsTransport};
pub use sink::{RemoteSink, RemoteTrack};
pub use types::{ParticipantId, RoomId};
