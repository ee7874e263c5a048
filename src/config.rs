use crate::media::{MediaConstraints, VideoConstraints};
use crate::peer::rtc::DEFAULT_ICE_SERVERS;
use clap::Parser;

pub const DEFAULT_API_ENDPOINT: &str = "http://127.0.0.1:8080/api/room";
pub const DEFAULT_SIGNALING_ENDPOINT: &str = "ws://127.0.0.1:8080/signal";

fn random_user() -> String {
    format!("user-{}", rand::random::<u32>())
}

/// Peer-to-peer audio/video call client.
#[derive(Debug, Clone, Parser)]
#[command(name = "peerchat", version)]
pub struct Config {
    /// Room to join.
    #[arg(long, env = "PEERCHAT_ROOM")]
    pub room: String,

    /// Name to join under. Random when not given.
    #[arg(long, env = "PEERCHAT_USER", default_value_t = random_user())]
    pub user: String,

    /// Room membership API endpoint.
    #[arg(long, env = "PEERCHAT_API_ENDPOINT", default_value = DEFAULT_API_ENDPOINT)]
    pub api_endpoint: String,

    /// Signaling base URL; `/room/<room>/user/<user>` is appended.
    #[arg(long, env = "PEERCHAT_SIGNALING_ENDPOINT", default_value = DEFAULT_SIGNALING_ENDPOINT)]
    pub signaling_endpoint: String,

    /// STUN/TURN server URLs.
    #[arg(
        long = "ice-server",
        env = "PEERCHAT_ICE_SERVERS",
        value_delimiter = ',',
        default_values_t = DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect::<Vec<_>>()
    )]
    pub ice_servers: Vec<String>,

    #[arg(long, default_value_t = 640)]
    pub min_width: u32,

    #[arg(long, default_value_t = 1920)]
    pub max_width: u32,

    #[arg(long, default_value_t = 480)]
    pub min_height: u32,

    #[arg(long, default_value_t = 1080)]
    pub max_height: u32,

    /// Join without a microphone track.
    #[arg(long)]
    pub no_audio: bool,

    /// Join without a camera track.
    #[arg(long)]
    pub no_video: bool,
}

impl Config {
    pub fn media_constraints(&self) -> MediaConstraints {
        MediaConstraints {
            video: (!self.no_video).then_some(VideoConstraints {
                min_width: self.min_width,
                max_width: self.max_width,
                min_height: self.min_height,
                max_height: self.max_height,
            }),
            audio: !self.no_audio,
        }
    }
}
