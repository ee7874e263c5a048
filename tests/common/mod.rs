#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use peerchat::error::{Error, Result};
use peerchat::media::{LocalMedia, LocalTrack};
use peerchat::peer::{ConnectionFactory, PeerConnection, PeerEvent, PeerEvents};
use peerchat::presentation::{Presentation, ViewMonitor};
use peerchat::registry::PeerRegistry;
use peerchat::signaling::{
    Announcement, AnnouncementKind, AnnouncementStream, IceCandidate, OutboundMessage,
    SessionDescription, SignalKind, Transport,
};
use peerchat::sink::RemoteSink;
use peerchat::{MediaContext, ParticipantId, SignalingController};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

/// In-memory relay link recording everything sent through it.
#[derive(Default)]
pub struct FakeTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    listener: Mutex<Option<mpsc::UnboundedSender<Announcement>>>,
    addresses: Mutex<Vec<String>>,
    connected: AtomicBool,
    disconnects: AtomicUsize,
    fail_connect: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let transport = Self::default();
        transport.fail_connect.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    /// Delivers `announcement` to the registered listener, as the relay would.
    pub fn inject(&self, announcement: Announcement) -> bool {
        match self.listener.lock().as_ref() {
            Some(tx) => tx.send(announcement).is_ok(),
            None => false,
        }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, dst: &str, kind: SignalKind) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.dst.as_str() == dst && m.kind == kind)
            .cloned()
            .collect()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.addresses.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, address: &str) -> Result<()> {
        self.addresses.lock().push(address.to_string());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, message: &OutboundMessage) {
        if self.connected.load(Ordering::SeqCst) {
            self.sent.lock().push(message.clone());
        }
    }

    fn listen(&self) -> AnnouncementStream {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.listener.lock() = Some(tx);
        rx
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.listener.lock().take();
    }
}

/// Scripted peer connection.
pub struct FakeConnection {
    pub peer: ParticipantId,
    pub serial: u64,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    offers: AtomicUsize,
    restarts: AtomicUsize,
    closed: AtomicBool,
    fail_negotiation: bool,
    gate: Option<Arc<Semaphore>>,
    events: Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>,
}

impl FakeConnection {
    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
    }

    fn refuse(&self) -> Result<()> {
        if self.fail_negotiation {
            return Err(Error::InvalidPayload {
                kind: "session description",
                reason: format!("{} refused to negotiate", self.peer),
            });
        }
        Ok(())
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pushes an event as the connectivity layer would. Fails once closed.
    pub fn emit(&self, event: PeerEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.pass_gate().await;
        self.refuse()?;
        let n = self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!(
            "offer-{}-{}-{}",
            self.peer, self.serial, n
        )))
    }

    async fn create_answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.pass_gate().await;
        self.refuse()?;
        *self.remote.lock() = Some(offer);
        Ok(SessionDescription::answer(format!(
            "answer-{}-{}",
            self.peer, self.serial
        )))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.refuse()?;
        *self.remote.lock() = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.candidates.lock().push(candidate);
        Ok(())
    }

    async fn restart_ice(&self) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.events.lock().take();
        Ok(())
    }
}

/// Builds [`FakeConnection`]s and remembers every one it handed out.
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<FakeConnection>>>,
    failing: Mutex<HashSet<ParticipantId>>,
    gates: Mutex<HashMap<ParticipantId, Arc<Semaphore>>>,
    serial: AtomicU64,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connections to `peer` fail every negotiation step.
    pub fn fail_for(&self, peer: &str) {
        self.failing.lock().insert(peer.into());
    }

    /// Connections to `peer` block negotiation until the returned gate gets
    /// a permit.
    pub fn block(&self, peer: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(peer.into(), gate.clone());
        gate
    }

    pub fn created(&self) -> Vec<Arc<FakeConnection>> {
        self.created.lock().clone()
    }

    pub fn created_for(&self, peer: &str) -> Vec<Arc<FakeConnection>> {
        self.created
            .lock()
            .iter()
            .filter(|c| c.peer.as_str() == peer)
            .cloned()
            .collect()
    }

    pub fn latest(&self, peer: &str) -> Option<Arc<FakeConnection>> {
        self.created_for(peer).pop()
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(
        &self,
        peer: &ParticipantId,
        _local: &LocalMedia,
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(FakeConnection {
            peer: peer.clone(),
            serial: self.serial.fetch_add(1, Ordering::SeqCst),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            offers: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            fail_negotiation: self.failing.lock().contains(peer),
            gate: self.gates.lock().get(peer).cloned(),
            events: Mutex::new(Some(tx)),
        });
        self.created.lock().push(connection.clone());
        Ok((connection, rx))
    }
}

/// Presentation that records each call.
#[derive(Default)]
pub struct RecordingPresentation {
    pub view: ViewMonitor,
    calls: Mutex<Vec<(&'static str, bool)>>,
}

impl RecordingPresentation {
    pub fn calls(&self) -> Vec<(&'static str, bool)> {
        self.calls.lock().clone()
    }
}

impl Presentation for RecordingPresentation {
    fn show_remote_video(&self, show: bool) {
        self.calls.lock().push(("show_remote_video", show));
        self.view.show_remote_video(show);
    }

    fn shrink_local_video(&self, shrink: bool) {
        self.calls.lock().push(("shrink_local_video", shrink));
        self.view.shrink_local_video(shrink);
    }
}

pub fn local_media() -> LocalMedia {
    LocalMedia::new(vec![LocalTrack::audio("test"), LocalTrack::video("test")])
}

pub fn media_context(presentation: Arc<RecordingPresentation>) -> MediaContext {
    MediaContext {
        local: local_media(),
        sink: RemoteSink::new(),
        presentation,
    }
}

pub struct Harness {
    pub controller: Arc<SignalingController>,
    pub transport: Arc<FakeTransport>,
    pub factory: Arc<FakeFactory>,
    pub presentation: Arc<RecordingPresentation>,
    pub sink: RemoteSink,
}

/// A controller for `self_id` in room `r1`, wired to fakes, with the
/// transport already connected.
pub async fn harness(self_id: &str) -> Harness {
    let transport = FakeTransport::new();
    transport.connect("ws://relay/signal/room/r1/user").await.unwrap();
    let factory = FakeFactory::new();
    let presentation = Arc::new(RecordingPresentation::default());
    let media = media_context(presentation.clone());
    let sink = media.sink.clone();
    let controller = Arc::new(SignalingController::new(
        "r1".into(),
        self_id.into(),
        PeerRegistry::new(),
        factory.clone(),
        transport.clone(),
        media,
    ));
    Harness {
        controller,
        transport,
        factory,
        presentation,
        sink,
    }
}

pub fn offer(src: &str, sdp: &str) -> Announcement {
    Announcement::new(
        src,
        AnnouncementKind::Offer,
        Some(json!({ "type": "offer", "sdp": sdp })),
    )
}

pub fn answer(src: &str, sdp: &str) -> Announcement {
    Announcement::new(
        src,
        AnnouncementKind::Answer,
        Some(json!({ "type": "answer", "sdp": sdp })),
    )
}

pub fn candidate(src: &str, candidate: &str) -> Announcement {
    Announcement::new(
        src,
        AnnouncementKind::Candidate,
        Some(json!({ "candidate": candidate, "sdpMid": "0", "sdpMLineIndex": 0 })),
    )
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
