use crate::controller::MediaContext;
use crate::error::{Error, Result};
use crate::media::{MediaConstraints, MediaSource};
use crate::peer::ConnectionFactory;
use crate::presentation::Presentation;
use crate::room::RoomApi;
use crate::session::{Session, SessionParams};
use crate::signaling::Transport;
use crate::sink::RemoteSink;
use crate::types::{ParticipantId, RoomId};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CallParams {
    pub room: RoomId,
    pub user: ParticipantId,
    pub signaling_base: String,
    pub constraints: MediaConstraints,
}

/// External collaborators a call is wired to.
#[derive(Clone)]
pub struct CallServices {
    pub room_api: Arc<dyn RoomApi>,
    pub media_source: Arc<dyn MediaSource>,
    pub transport: Arc<dyn Transport>,
    pub factory: Arc<dyn ConnectionFactory>,
    pub presentation: Arc<dyn Presentation>,
}

/// Joins the room, acquires local media and starts signaling, in that
/// order. Any failure aborts the whole attempt.
pub async fn start_call(params: CallParams, services: CallServices) -> Result<Session> {
    if params.user.is_empty() {
        return Err(Error::InvalidInput("empty username".to_string()));
    }
    if params.room.is_empty() {
        return Err(Error::InvalidInput("empty room code".to_string()));
    }

    services.room_api.join(&params.room, &params.user).await?;

    let local = services.media_source.acquire(&params.constraints).await?;
    info!(room = %params.room, user = %params.user, tracks = local.len(), "starting call");

    let media = MediaContext {
        local,
        sink: RemoteSink::new(),
        presentation: services.presentation,
    };
    Session::start(
        SessionParams {
            signaling_base: params.signaling_base,
            room: params.room,
            self_id: params.user,
        },
        services.transport,
        services.factory,
        media,
    )
    .await
}
