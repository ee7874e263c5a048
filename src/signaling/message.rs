use crate::error::{Error, Result};
use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Type tag of an inbound announcement.
///
/// Unrecognized tags are kept verbatim so they can be logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnnouncementKind {
    Joined,
    Left,
    Offer,
    Answer,
    Candidate,
    Unknown(String),
}

impl From<String> for AnnouncementKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "joined" => Self::Joined,
            "left" => Self::Left,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "candidate" => Self::Candidate,
            _ => Self::Unknown(s),
        }
    }
}

impl From<AnnouncementKind> for String {
    fn from(kind: AnnouncementKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnouncementKind::Joined => write!(f, "joined"),
            AnnouncementKind::Left => write!(f, "left"),
            AnnouncementKind::Offer => write!(f, "offer"),
            AnnouncementKind::Answer => write!(f, "answer"),
            AnnouncementKind::Candidate => write!(f, "candidate"),
            AnnouncementKind::Unknown(other) => write!(f, "{}", other),
        }
    }
}

/// Inbound signaling message relayed by the server.
///
/// `src` is assigned by the relay from the sender's socket; a message without
/// it cannot be attributed to any peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub src: Option<ParticipantId>,
    #[serde(rename = "type")]
    pub kind: AnnouncementKind,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl Announcement {
    pub fn new(src: impl Into<ParticipantId>, kind: AnnouncementKind, payload: Option<Value>) -> Self {
        Self {
            src: Some(src.into()),
            kind,
            payload,
        }
    }

    pub fn joined(src: impl Into<ParticipantId>) -> Self {
        Self::new(src, AnnouncementKind::Joined, None)
    }

    pub fn left(src: impl Into<ParticipantId>) -> Self {
        Self::new(src, AnnouncementKind::Left, None)
    }

    /// Decodes the payload as a session description, if one is present.
    pub fn description(&self) -> Result<Option<SessionDescription>> {
        decode(&self.payload, "session description")
    }

    /// Decodes the payload as a connectivity candidate, if one is present.
    pub fn candidate(&self) -> Result<Option<IceCandidate>> {
        decode(&self.payload, "candidate")
    }
}

fn decode<T: for<'de> Deserialize<'de>>(payload: &Option<Value>, kind: &'static str) -> Result<Option<T>> {
    match payload {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| Error::InvalidPayload {
                kind,
                reason: e.to_string(),
            }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

/// Message addressed to a single remote participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub dst: ParticipantId,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new<T: Serialize>(dst: ParticipantId, kind: SignalKind, payload: &T) -> Result<Self> {
        Ok(Self {
            dst,
            kind,
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn offer(dst: ParticipantId, offer: &SessionDescription) -> Result<Self> {
        Self::new(dst, SignalKind::Offer, offer)
    }

    pub fn answer(dst: ParticipantId, answer: &SessionDescription) -> Result<Self> {
        Self::new(dst, SignalKind::Answer, answer)
    }

    pub fn candidate(dst: ParticipantId, candidate: &IceCandidate) -> Result<Self> {
        Self::new(dst, SignalKind::Candidate, candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Session description in the shape browsers produce with `toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate in the shape browsers produce with `toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}
