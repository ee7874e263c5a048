//! Local media: the tracks captured on this side and shared by every peer
//! connection.

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl From<RTPCodecType> for TrackKind {
    fn from(codec_type: RTPCodecType) -> Self {
        match codec_type {
            RTPCodecType::Audio => Self::Audio,
            _ => Self::Video,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// One locally captured track.
///
/// Clones share the enabled/stopped flags, so muting through any clone mutes
/// every peer connection the track was attached to.
#[derive(Clone)]
pub struct LocalTrack {
    kind: TrackKind,
    track: Arc<TrackLocalStaticSample>,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            track,
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn audio(stream_id: &str) -> Self {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.to_owned(),
        );
        Self::new(TrackKind::Audio, Arc::new(track))
    }

    pub fn video(stream_id: &str) -> Self {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            "video".to_owned(),
            stream_id.to_owned(),
        );
        Self::new(TrackKind::Video, Arc::new(track))
    }

    pub fn id(&self) -> &str {
        self.track.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Handle to attach to a peer connection.
    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.track) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Feeds one encoded sample to every attached connection. Disabled or
    /// stopped tracks swallow samples.
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        if self.is_stopped() || !self.is_enabled() {
            return Ok(());
        }
        self.track.write_sample(sample).await?;
        Ok(())
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The local media stream. Cheap to clone; clones share the track set.
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    tracks: Arc<Mutex<Vec<LocalTrack>>>,
}

impl LocalMedia {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self {
            tracks: Arc::new(Mutex::new(tracks)),
        }
    }

    pub fn tracks(&self) -> Vec<LocalTrack> {
        self.tracks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.tracks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }

    /// Flips every track of `kind` and returns the new state, or `None` when
    /// there is no such track.
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let tracks = self.tracks.lock();
        let mut state = None;
        for track in tracks.iter().filter(|t| t.kind() == kind) {
            let enabled = !track.is_enabled();
            track.set_enabled(enabled);
            state = Some(enabled);
        }
        if let Some(enabled) = state {
            debug!(%kind, enabled, "local track toggled");
        }
        state
    }

    /// Stops and detaches every track. Returns how many were removed.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<LocalTrack> = self.tracks.lock().drain(..).collect();
        for track in &drained {
            debug!(track = %track.id(), kind = %track.kind(), "removing local track");
            track.stop();
        }
        drained.len()
    }
}

/// Requested video resolution bounds, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            min_width: 640,
            max_width: 1920,
            min_height: 480,
            max_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: Option<VideoConstraints>,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: Some(VideoConstraints::default()),
            audio: true,
        }
    }
}

impl MediaConstraints {
    pub fn validate(&self) -> Result<()> {
        if self.video.is_none() && !self.audio {
            return Err(Error::Media("neither audio nor video requested".to_string()));
        }
        if let Some(video) = &self.video {
            if video.min_width == 0 || video.min_height == 0 {
                return Err(Error::Media("video dimensions must be positive".to_string()));
            }
            if video.min_width > video.max_width || video.min_height > video.max_height {
                return Err(Error::Media(format!(
                    "unsatisfiable video bounds {}x{}..{}x{}",
                    video.min_width, video.min_height, video.max_width, video.max_height
                )));
            }
        }
        Ok(())
    }
}

/// Acquires the local media stream. Failures abort the call.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia>;
}

/// Produces encoder-fed sample tracks instead of reading capture devices.
/// Samples are pushed with [`LocalTrack::write_sample`].
pub struct SyntheticMediaSource {
    stream_id: String,
}

impl SyntheticMediaSource {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

#[async_trait]
impl MediaSource for SyntheticMediaSource {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia> {
        constraints.validate()?;

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(LocalTrack::audio(&self.stream_id));
        }
        if constraints.video.is_some() {
            tracks.push(LocalTrack::video(&self.stream_id));
        }
        info!(stream = %self.stream_id, tracks = tracks.len(), "local media acquired");
        Ok(LocalMedia::new(tracks))
    }
}
