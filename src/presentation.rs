use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Rendering hooks driven by the signaling controller.
pub trait Presentation: Send + Sync {
    /// Shows or hides the remote video area.
    fn show_remote_video(&self, visible: bool);

    /// Shrinks the local preview while a peer is on screen, restores it
    /// otherwise.
    fn shrink_local_video(&self, small: bool);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub remote_visible: bool,
    pub local_small: bool,
}

/// [`Presentation`] that publishes the requested layout on a watch channel
/// for whatever front end renders it.
#[derive(Clone)]
pub struct ViewMonitor {
    state: Arc<watch::Sender<ViewState>>,
    receiver: watch::Receiver<ViewState>,
}

impl Default for ViewMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewMonitor {
    pub fn new() -> Self {
        let (state, receiver) = watch::channel(ViewState::default());
        Self {
            state: Arc::new(state),
            receiver,
        }
    }

    pub fn current(&self) -> ViewState {
        *self.receiver.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.receiver.clone()
    }
}

impl Presentation for ViewMonitor {
    fn show_remote_video(&self, visible: bool) {
        self.state.send_if_modified(|state| {
            if state.remote_visible == visible {
                return false;
            }
            state.remote_visible = visible;
            info!(visible, "remote video");
            true
        });
    }

    fn shrink_local_video(&self, small: bool) {
        self.state.send_if_modified(|state| {
            if state.local_small == small {
                return false;
            }
            state.local_small = small;
            info!(small, "local video frame");
            true
        });
    }
}
