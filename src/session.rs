use crate::controller::{Dispatcher, MediaContext, SignalingController};
use crate::error::{Error, Result};
use crate::media::{LocalMedia, TrackKind};
use crate::peer::ConnectionFactory;
use crate::registry::PeerRegistry;
use crate::signaling::Transport;
use crate::sink::RemoteSink;
use crate::types::{ParticipantId, RoomId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Base of the signaling endpoint, e.g. `wss://host/signal`.
    pub signaling_base: String,
    pub room: RoomId,
    pub self_id: ParticipantId,
}

impl SessionParams {
    /// `<signaling-base>/room/<room>/user/<self>`, with both identities
    /// percent-encoded as path segments.
    pub fn address(&self) -> Result<String> {
        let mut url = Url::parse(&self.signaling_base)?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput(format!("{} cannot carry a path", self.signaling_base)))?
            .pop_if_empty()
            .push("room")
            .push(self.room.as_str())
            .push("user")
            .push(self.self_id.as_str());
        Ok(url.into())
    }
}

/// One local participant's membership in one room.
pub struct Session {
    room: RoomId,
    self_id: ParticipantId,
    controller: Arc<SignalingController>,
    transport: Arc<dyn Transport>,
    media: MediaContext,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Session {
    /// Registers the announcement listener, then connects the transport.
    /// A failed connect aborts the start.
    pub async fn start(
        params: SessionParams,
        transport: Arc<dyn Transport>,
        factory: Arc<dyn ConnectionFactory>,
        media: MediaContext,
    ) -> Result<Self> {
        let address = params.address()?;
        let controller = Arc::new(SignalingController::new(
            params.room.clone(),
            params.self_id.clone(),
            PeerRegistry::new(),
            factory,
            transport.clone(),
            media.clone(),
        ));

        let inbound = transport.listen();
        let dispatcher = tokio::spawn(Dispatcher::new(controller.clone()).run(inbound));

        if let Err(e) = transport.connect(&address).await {
            dispatcher.abort();
            return Err(e);
        }
        info!(room = %params.room, user = %params.self_id, "signaling started");

        Ok(Self {
            room: params.room,
            self_id: params.self_id,
            controller,
            transport,
            media,
            dispatcher: Mutex::new(Some(dispatcher)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Closes every peer connection, stops all remote and local tracks and
    /// disconnects the transport. Calling it again does nothing.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!(room = %self.room, "session already stopped");
            return;
        }

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }
        self.controller.shutdown().await;
        let local = self.media.local.stop_all();
        self.transport.disconnect().await;

        info!(room = %self.room, user = %self.self_id, local_tracks = local, "session stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns whether the camera is now on, or `None` without a camera.
    pub fn toggle_camera(&self) -> Option<bool> {
        self.media.local.toggle(TrackKind::Video)
    }

    /// Returns whether the microphone is now on, or `None` without one.
    pub fn toggle_mic(&self) -> Option<bool> {
        self.media.local.toggle(TrackKind::Audio)
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    pub fn peers(&self) -> Vec<ParticipantId> {
        self.controller.peers()
    }

    pub fn controller(&self) -> &Arc<SignalingController> {
        &self.controller
    }

    pub fn remote_sink(&self) -> &RemoteSink {
        &self.media.sink
    }

    pub fn local_media(&self) -> &LocalMedia {
        &self.media.local
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.abort();
        }
    }
}
