use crate::error::Result;
use crate::media::LocalMedia;
use crate::peer::{ConnectionFactory, ConnectionState, PeerConnection, PeerEvent, PeerEvents};
use crate::signaling::{IceCandidate, SessionDescription};
use crate::sink::RemoteTrack;
use crate::types::ParticipantId;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

pub const DEFAULT_ICE_SERVERS: &[&str] = &[
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
];

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        }
    }
}

// Both types share the browser JSON shape, so serde is the conversion.
fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    Ok(serde_json::from_value(serde_json::to_value(description)?)?)
}

fn from_rtc(description: &RTCSessionDescription) -> Result<SessionDescription> {
    Ok(serde_json::from_value(serde_json::to_value(description)?)?)
}

/// Event slot shared by the connection callbacks. Emptied on close so the
/// event stream ends.
type EventSlot = Arc<Mutex<Option<mpsc::UnboundedSender<PeerEvent>>>>;

fn emit(slot: &EventSlot, event: PeerEvent) {
    if let Some(tx) = slot.lock().as_ref() {
        let _ = tx.send(event);
    }
}

/// [`PeerConnection`] backed by a webrtc-rs `RTCPeerConnection`.
pub struct RtcPeerConnection {
    peer: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
    ice_restart: AtomicBool,
    events: EventSlot,
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let options = self.ice_restart.swap(false, Ordering::SeqCst).then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self.peer_connection.create_offer(options).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        debug!(peer = %self.peer, "offer created");
        from_rtc(&offer)
    }

    async fn create_answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        self.peer_connection
            .set_remote_description(to_rtc(offer)?)
            .await?;
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        debug!(peer = %self.peer, "answer created");
        from_rtc(&answer)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(RTCIceCandidateInit::from(candidate))
            .await?;
        Ok(())
    }

    async fn restart_ice(&self) -> Result<()> {
        self.ice_restart.store(true, Ordering::SeqCst);
        debug!(peer = %self.peer, "ice restart requested");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.events.lock().take();
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Builds webrtc-rs peer connections sharing one API instance and one ICE
/// server list.
pub struct RtcConnectionFactory {
    api: API,
    config: RTCConfiguration,
}

impl RtcConnectionFactory {
    pub fn new(ice_servers: &[String]) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(
        &self,
        peer: &ParticipantId,
        local: &LocalMedia,
    ) -> Result<(Arc<dyn PeerConnection>, PeerEvents)> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.config.clone()).await?);
        let (tx, rx) = mpsc::unbounded_channel();
        let events: EventSlot = Arc::new(Mutex::new(Some(tx)));

        let slot = events.clone();
        let track_peer = peer.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                emit(
                    &slot,
                    PeerEvent::Track(RemoteTrack::from_rtc(track_peer.clone(), track)),
                );
                Box::pin(async {})
            },
        ));

        let slot = events.clone();
        let candidate_peer = peer.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => emit(&slot, PeerEvent::Candidate(init.into())),
                    Err(e) => warn!(peer = %candidate_peer, "failed to serialize candidate: {}", e),
                }
            }
            Box::pin(async {})
        }));

        let slot = events.clone();
        let state_peer = peer.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                debug!(peer = %state_peer, "peer connection state has changed: {}", s);
                emit(&slot, PeerEvent::State(ConnectionState::from(s)));
                Box::pin(async {})
            },
        ));

        for track in local.tracks() {
            let sender = peer_connection.add_track(track.rtc_track()).await?;
            // RTCP has to be drained for interceptors to work.
            tokio::spawn(async move {
                let mut rtcp_buf = vec![0u8; 1500];
                while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
            });
        }

        info!(%peer, tracks = local.len(), "peer connection created");
        let connection = RtcPeerConnection {
            peer: peer.clone(),
            peer_connection,
            ice_restart: AtomicBool::new(false),
            events,
        };
        Ok((Arc::new(connection), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalTrack;
    use crate::signaling::SdpKind;
    use std::time::Duration;

    fn media() -> LocalMedia {
        LocalMedia::new(vec![LocalTrack::audio("test"), LocalTrack::video("test")])
    }

    #[tokio::test]
    async fn negotiates_offer_and_answer_locally() {
        let factory = RtcConnectionFactory::new(&[]).unwrap();
        let (alice, _alice_events) = factory.create(&"bob".into(), &media()).await.unwrap();
        let (bob, _bob_events) = factory.create(&"alice".into(), &media()).await.unwrap();

        let offer = alice.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("m=audio"));
        assert!(offer.sdp.contains("m=video"));

        let answer = bob.create_answer(offer).await.unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
        alice.set_remote_description(answer).await.unwrap();

        alice.restart_ice().await.unwrap();
        let restart = alice.create_offer().await.unwrap();
        assert_eq!(restart.kind, SdpKind::Offer);

        alice.close().await.unwrap();
        bob.close().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_garbage_remote_description() {
        let factory = RtcConnectionFactory::new(&[]).unwrap();
        let (pc, _events) = factory.create(&"bob".into(), &media()).await.unwrap();
        let result = pc
            .set_remote_description(SessionDescription::answer("not sdp"))
            .await;
        assert!(result.is_err());
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn event_stream_ends_on_close() {
        let factory = RtcConnectionFactory::new(&[]).unwrap();
        let (pc, mut events) = factory.create(&"bob".into(), &media()).await.unwrap();
        pc.create_offer().await.unwrap();
        pc.close().await.unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[test]
    fn candidate_round_trips_through_rtc_type() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        let init = RTCIceCandidateInit::from(candidate.clone());
        assert_eq!(IceCandidate::from(init), candidate);
    }
}
