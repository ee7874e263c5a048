//! The signaling state machine.
//!
//! Per remote participant: `absent -> connecting -> connected -> absent`.
//! Closed connections are dropped from the registry rather than kept in a
//! terminal state.
//!
//! Offer collisions ("glare") are settled by identity order: when an offer
//! arrives while our own offer to that peer is unanswered, the participant
//! whose identity sorts lower keeps its offer and ignores the incoming one,
//! and the higher one throws its connection away and answers on a new one.
//! The lower side keeps ignoring offers from that peer until its own offer
//! is answered or the peer leaves; an offer lost in transit therefore locks
//! renegotiation out until the next "left"/"joined" cycle.

pub mod dispatch;

use crate::error::{Error, Result};
use crate::media::LocalMedia;
use crate::peer::{ConnectionFactory, ConnectionState, PeerConnection, PeerEvent, PeerEvents};
use crate::presentation::Presentation;
use crate::registry::{PeerRegistry, PeerState};
use crate::signaling::{Announcement, AnnouncementKind, OutboundMessage, Transport};
use crate::sink::RemoteSink;
use crate::types::{ParticipantId, RoomId};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use dispatch::Dispatcher;

/// Local media state every peer connection hangs off.
#[derive(Clone)]
pub struct MediaContext {
    pub local: LocalMedia,
    pub sink: RemoteSink,
    pub presentation: Arc<dyn Presentation>,
}

struct Shared {
    registry: PeerRegistry,
    stopped: bool,
}

pub struct SignalingController {
    room: RoomId,
    self_id: ParticipantId,
    shared: Arc<Mutex<Shared>>,
    factory: Arc<dyn ConnectionFactory>,
    transport: Arc<dyn Transport>,
    media: MediaContext,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl SignalingController {
    pub fn new(
        room: RoomId,
        self_id: ParticipantId,
        registry: PeerRegistry,
        factory: Arc<dyn ConnectionFactory>,
        transport: Arc<dyn Transport>,
        media: MediaContext,
    ) -> Self {
        Self {
            room,
            self_id,
            shared: Arc::new(Mutex::new(Shared {
                registry,
                stopped: false,
            })),
            factory,
            transport,
            media,
            pumps: Mutex::new(Vec::new()),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    pub fn peers(&self) -> Vec<ParticipantId> {
        self.shared.lock().registry.peers()
    }

    pub fn peer_state(&self, peer: &ParticipantId) -> Option<PeerState> {
        self.shared.lock().registry.get(peer).map(|entry| entry.state())
    }

    pub fn connection(&self, peer: &ParticipantId) -> Option<Arc<dyn PeerConnection>> {
        self.shared.lock().registry.connection(peer)
    }

    /// Applies one announcement. Errors are negotiation failures confined to
    /// the announcing peer; the controller stays usable.
    pub async fn handle_announcement(&self, announcement: Announcement) -> Result<()> {
        if self.shared.lock().stopped {
            debug!(room = %self.room, kind = %announcement.kind, "session stopped, ignoring announcement");
            return Ok(());
        }
        let Some(src) = announcement.src.clone() else {
            warn!(room = %self.room, kind = %announcement.kind, "announcement without source");
            return Ok(());
        };
        debug!(room = %self.room, peer = %src, kind = %announcement.kind, "got announcement");

        match &announcement.kind {
            AnnouncementKind::Joined => self.on_joined(&src).await,
            AnnouncementKind::Left => {
                self.on_left(&src).await;
                Ok(())
            }
            AnnouncementKind::Offer => self.on_offer(&src, &announcement).await,
            AnnouncementKind::Answer => self.on_answer(&src, &announcement).await,
            AnnouncementKind::Candidate => self.on_candidate(&src, &announcement).await,
            AnnouncementKind::Unknown(kind) => {
                info!(room = %self.room, peer = %src, "unknown announcement type: {}", kind);
                Ok(())
            }
        }
    }

    async fn on_joined(&self, src: &ParticipantId) -> Result<()> {
        self.media.presentation.shrink_local_video(true);

        let existing = self.connection(src);
        let connection = match existing {
            Some(connection) => {
                info!(room = %self.room, peer = %src, "user rejoined");
                connection.restart_ice().await?;
                connection
            }
            None => {
                info!(room = %self.room, peer = %src, "new user has joined");
                self.connect(src).await?
            }
        };

        let offer = connection.create_offer().await?;
        {
            let mut shared = self.shared.lock();
            shared.registry.set_state(src, PeerState::Connecting);
            shared.registry.set_offer_pending(src, true);
        }
        self.send(OutboundMessage::offer(src.clone(), &offer)?);
        Ok(())
    }

    async fn on_left(&self, src: &ParticipantId) {
        match self.teardown(src).await {
            Some(remaining) => {
                if remaining == 0 {
                    self.media.presentation.show_remote_video(false);
                    self.media.presentation.shrink_local_video(false);
                }
                info!(room = %self.room, peer = %src, remaining, "user left");
            }
            None => info!(room = %self.room, peer = %src, "got left for unknown peer"),
        }
    }

    async fn on_offer(&self, src: &ParticipantId, announcement: &Announcement) -> Result<()> {
        let Some(offer) = announcement.description()? else {
            warn!(room = %self.room, peer = %src, "got offer without payload");
            return Ok(());
        };
        self.media.presentation.shrink_local_video(true);

        let existing = {
            let shared = self.shared.lock();
            shared
                .registry
                .get(src)
                .map(|entry| (entry.connection().clone(), entry.offer_pending()))
        };
        let connection = match existing {
            Some((_, true)) if self.self_id < *src => {
                info!(room = %self.room, peer = %src, "offer collision, keeping our own offer");
                return Ok(());
            }
            Some((_, true)) => {
                info!(room = %self.room, peer = %src, "offer collision, yielding to remote offer");
                self.teardown(src).await;
                self.connect(src).await?
            }
            Some((connection, false)) => connection,
            None => self.connect(src).await?,
        };

        let answer = connection.create_answer(offer).await?;
        self.shared
            .lock()
            .registry
            .set_state(src, PeerState::Connected);
        self.send(OutboundMessage::answer(src.clone(), &answer)?);
        Ok(())
    }

    async fn on_answer(&self, src: &ParticipantId, announcement: &Announcement) -> Result<()> {
        let connection = self.connection(src);
        let Some(connection) = connection else {
            info!(room = %self.room, peer = %src, "got answer for unknown peer");
            return Ok(());
        };
        let Some(answer) = announcement.description()? else {
            warn!(room = %self.room, peer = %src, "got answer without payload");
            return Ok(());
        };

        connection.set_remote_description(answer).await?;
        let mut shared = self.shared.lock();
        shared.registry.set_offer_pending(src, false);
        shared.registry.set_state(src, PeerState::Connected);
        Ok(())
    }

    async fn on_candidate(&self, src: &ParticipantId, announcement: &Announcement) -> Result<()> {
        let connection = self.connection(src);
        let Some(connection) = connection else {
            info!(room = %self.room, peer = %src, "got ice candidate for unknown peer");
            return Ok(());
        };
        let Some(candidate) = announcement.candidate()? else {
            warn!(room = %self.room, peer = %src, "got candidate without payload");
            return Ok(());
        };
        connection.add_ice_candidate(candidate).await
    }

    /// Creates and registers a connection for `src`, and starts forwarding
    /// its events.
    async fn connect(&self, src: &ParticipantId) -> Result<Arc<dyn PeerConnection>> {
        let (connection, events) = self.factory.create(src, &self.media.local).await?;

        let generation = {
            let mut shared = self.shared.lock();
            if shared.stopped {
                None
            } else {
                Some(shared.registry.insert(src.clone(), connection.clone()))
            }
        };
        let Some(generation) = generation else {
            if let Err(e) = connection.close().await {
                debug!(room = %self.room, peer = %src, "failed to close connection: {}", e);
            }
            return Err(Error::Stopped);
        };

        self.media.presentation.show_remote_video(true);
        self.spawn_pump(src.clone(), generation, events);
        Ok(connection)
    }

    /// Unregisters `src`, stops its remote tracks and closes its connection.
    /// Returns the number of peers left, or `None` if `src` was unknown.
    async fn teardown(&self, src: &ParticipantId) -> Option<usize> {
        let (entry, remaining) = {
            let mut shared = self.shared.lock();
            let entry = shared.registry.remove(src);
            if entry.is_some() {
                self.media.sink.remove_peer(src);
            }
            (entry, shared.registry.len())
        };
        let entry = entry?;
        if let Err(e) = entry.connection().close().await {
            warn!(room = %self.room, peer = %src, "failed to close connection: {}", e);
        }
        Some(remaining)
    }

    fn spawn_pump(&self, peer: ParticipantId, generation: u64, mut events: PeerEvents) {
        let shared = self.shared.clone();
        let sink = self.media.sink.clone();
        let transport = self.transport.clone();
        let room = self.room.clone();

        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PeerEvent::Candidate(candidate) => {
                        if !shared.lock().registry.is_current(&peer, generation) {
                            debug!(%room, %peer, "dropping candidate from closed connection");
                            continue;
                        }
                        match OutboundMessage::candidate(peer.clone(), &candidate) {
                            Ok(message) => transport.send(&message),
                            Err(e) => warn!(%room, %peer, "failed to encode candidate: {}", e),
                        }
                    }
                    PeerEvent::Track(track) => {
                        let shared = shared.lock();
                        if shared.registry.is_current(&peer, generation) && track.peer() == &peer {
                            sink.add(track);
                        } else {
                            debug!(%room, %peer, "dropping track from closed connection");
                        }
                    }
                    PeerEvent::State(ConnectionState::Failed) => {
                        warn!(%room, %peer, "peer connection failed");
                    }
                    PeerEvent::State(state) => {
                        debug!(%room, %peer, %state, "peer connection state");
                    }
                }
            }
            debug!(%room, %peer, generation, "peer events ended");
        });

        let mut pumps = self.pumps.lock();
        pumps.retain(|pump| !pump.is_finished());
        pumps.push(pump);
    }

    fn send(&self, message: OutboundMessage) {
        debug!(room = %self.room, dst = %message.dst, kind = ?message.kind, "sending");
        self.transport.send(&message);
    }

    /// Closes every connection and empties the remote sink. Later
    /// announcements are ignored.
    pub async fn shutdown(&self) {
        for pump in self.pumps.lock().drain(..) {
            pump.abort();
        }

        let entries = {
            let mut shared = self.shared.lock();
            shared.stopped = true;
            let entries = shared.registry.drain();
            self.media.sink.clear();
            entries
        };
        self.media.presentation.show_remote_video(false);

        let closes = entries.into_iter().map(|(peer, entry)| async move {
            if let Err(e) = entry.connection().close().await {
                warn!(room = %self.room, %peer, "failed to close connection: {}", e);
            }
        });
        join_all(closes).await;
    }
}
