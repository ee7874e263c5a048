use anyhow::Context;
use clap::Parser;
use peerchat::config::Config;
use peerchat::{
    start_call, CallParams, CallServices, HttpRoomApi, RtcConnectionFactory, SyntheticMediaSource,
    ViewMonitor, WsTransport,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("peerchat=info")),
        )
        .init();

    let config = Config::parse();
    let view = ViewMonitor::new();

    let services = CallServices {
        room_api: Arc::new(HttpRoomApi::new(&config.api_endpoint)?),
        media_source: Arc::new(SyntheticMediaSource::new(format!("peerchat-{}", config.user))),
        transport: Arc::new(WsTransport::new(config.room.clone())),
        factory: Arc::new(RtcConnectionFactory::new(&config.ice_servers)?),
        presentation: Arc::new(view.clone()),
    };
    let params = CallParams {
        room: config.room.clone().into(),
        user: config.user.clone().into(),
        signaling_base: config.signaling_endpoint.clone(),
        constraints: config.media_constraints(),
    };

    let session = start_call(params, services)
        .await
        .with_context(|| format!("unable to start call in room {}", config.room))?;

    let mut view_changes = view.subscribe();
    let mut remote_tracks = session.remote_sink().subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = view_changes.changed() => {
                let state = *view_changes.borrow_and_update();
                info!(remote_visible = state.remote_visible, local_small = state.local_small, "layout changed");
            }
            Ok(()) = remote_tracks.changed() => {
                let count = *remote_tracks.borrow_and_update();
                info!(remote_tracks = count, peers = ?session.peers(), "remote media changed");
            }
        }
    }

    info!("leaving room {}", config.room);
    session.stop().await;
    Ok(())
}
