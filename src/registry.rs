use crate::peer::PeerConnection;
use crate::types::ParticipantId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Negotiation progress of a registered peer. Absent peers have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Connected,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerState::Connecting => write!(f, "connecting"),
            PeerState::Connected => write!(f, "connected"),
        }
    }
}

pub struct PeerEntry {
    connection: Arc<dyn PeerConnection>,
    generation: u64,
    state: PeerState,
    offer_pending: bool,
}

impl PeerEntry {
    pub fn connection(&self) -> &Arc<dyn PeerConnection> {
        &self.connection
    }

    /// Distinguishes this handle from earlier ones for the same peer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Whether we sent an offer that has not been answered yet.
    pub fn offer_pending(&self) -> bool {
        self.offer_pending
    }
}

/// Who we are currently connected to: at most one handle per remote
/// participant.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<ParticipantId, PeerEntry>,
    next_generation: u64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh handle in the connecting state and returns its
    /// generation. Callers remove any previous handle first.
    pub fn insert(&mut self, peer: ParticipantId, connection: Arc<dyn PeerConnection>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let entry = PeerEntry {
            connection,
            generation,
            state: PeerState::Connecting,
            offer_pending: false,
        };
        if self.peers.insert(peer.clone(), entry).is_some() {
            warn!(%peer, "replaced a registered connection without closing it");
        }
        generation
    }

    pub fn get(&self, peer: &ParticipantId) -> Option<&PeerEntry> {
        self.peers.get(peer)
    }

    pub fn connection(&self, peer: &ParticipantId) -> Option<Arc<dyn PeerConnection>> {
        self.peers.get(peer).map(|entry| entry.connection.clone())
    }

    pub fn contains(&self, peer: &ParticipantId) -> bool {
        self.peers.contains_key(peer)
    }

    /// True while `generation` is the handle registered for `peer`.
    pub fn is_current(&self, peer: &ParticipantId, generation: u64) -> bool {
        self.peers
            .get(peer)
            .is_some_and(|entry| entry.generation == generation)
    }

    pub fn set_state(&mut self, peer: &ParticipantId, state: PeerState) {
        if let Some(entry) = self.peers.get_mut(peer) {
            entry.state = state;
        }
    }

    pub fn set_offer_pending(&mut self, peer: &ParticipantId, pending: bool) {
        if let Some(entry) = self.peers.get_mut(peer) {
            entry.offer_pending = pending;
        }
    }

    pub fn remove(&mut self, peer: &ParticipantId) -> Option<PeerEntry> {
        self.peers.remove(peer)
    }

    pub fn drain(&mut self) -> Vec<(ParticipantId, PeerEntry)> {
        self.peers.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Registered participants, sorted.
    pub fn peers(&self) -> Vec<ParticipantId> {
        let mut peers: Vec<ParticipantId> = self.peers.keys().cloned().collect();
        peers.sort();
        peers
    }
}
