//! The remote media sink: every inbound track from every live peer
//! connection, in one place.

use crate::media::TrackKind;
use crate::types::ParticipantId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use webrtc::track::track_remote::TrackRemote;

/// A track received from one remote participant.
#[derive(Clone)]
pub struct RemoteTrack {
    peer: ParticipantId,
    id: String,
    kind: TrackKind,
    stopped: Arc<AtomicBool>,
    source: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(peer: ParticipantId, id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            peer,
            id: id.into(),
            kind,
            stopped: Arc::new(AtomicBool::new(false)),
            source: None,
        }
    }

    pub fn from_rtc(peer: ParticipantId, track: Arc<TrackRemote>) -> Self {
        let mut remote = Self::new(peer, track.id(), TrackKind::from(track.kind()));
        remote.source = Some(track);
        remote
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// RTP source for renderers; `None` for tracks not backed by a live
    /// connection.
    pub fn source(&self) -> Option<&Arc<TrackRemote>> {
        self.source.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("peer", &self.peer)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Shared collection of inbound tracks consumed by rendering.
///
/// Only the signaling controller mutates it: tracks enter on arrival from a
/// registered connection and leave, stopped, when that peer departs or the
/// session ends. Subscribers see the current track count.
#[derive(Clone)]
pub struct RemoteSink {
    tracks: Arc<Mutex<Vec<RemoteTrack>>>,
    changes: Arc<watch::Sender<usize>>,
}

impl Default for RemoteSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteSink {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            tracks: Arc::new(Mutex::new(Vec::new())),
            changes: Arc::new(changes),
        }
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.lock().clone()
    }

    pub fn tracks_of(&self, peer: &ParticipantId) -> Vec<RemoteTrack> {
        self.tracks
            .lock()
            .iter()
            .filter(|t| t.peer() == peer)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.changes.subscribe()
    }

    pub(crate) fn add(&self, track: RemoteTrack) {
        let mut tracks = self.tracks.lock();
        debug!(peer = %track.peer(), track = %track.id(), kind = %track.kind(), "remote track added");
        tracks.push(track);
        self.changes.send_replace(tracks.len());
    }

    /// Stops and removes every track that came from `peer`.
    pub(crate) fn remove_peer(&self, peer: &ParticipantId) -> usize {
        let mut tracks = self.tracks.lock();
        let before = tracks.len();
        tracks.retain(|track| {
            if track.peer() == peer {
                track.stop();
                false
            } else {
                true
            }
        });
        let removed = before - tracks.len();
        if removed > 0 {
            debug!(%peer, removed, "remote tracks removed");
            self.changes.send_replace(tracks.len());
        }
        removed
    }

    /// Stops and removes every track.
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<RemoteTrack> = self.tracks.lock().drain(..).collect();
        for track in &drained {
            debug!(peer = %track.peer(), track = %track.id(), "removing remote track");
            track.stop();
        }
        self.changes.send_replace(0);
        drained.len()
    }
}
