use crate::controller::SignalingController;
use crate::signaling::{Announcement, AnnouncementKind, AnnouncementStream};
use crate::types::ParticipantId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Queues = Arc<Mutex<HashMap<ParticipantId, mpsc::UnboundedSender<Announcement>>>>;

/// Routes announcements to one FIFO queue per remote participant.
///
/// Each queue has its own worker, so announcements from one participant are
/// applied strictly in arrival order while a negotiation stuck on one peer
/// does not hold up the others. A worker retires once its participant has
/// left and nothing more is queued for it.
pub struct Dispatcher {
    controller: Arc<SignalingController>,
    queues: Queues,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(controller: Arc<SignalingController>) -> Self {
        Self {
            controller,
            queues: Arc::new(Mutex::new(HashMap::new())),
            workers: Vec::new(),
        }
    }

    /// Drains `inbound` until the transport drops the listener.
    pub async fn run(mut self, mut inbound: AnnouncementStream) {
        while let Some(announcement) = inbound.recv().await {
            self.dispatch(announcement);
        }
        debug!(room = %self.controller.room(), "announcement stream ended");
        // Let queued work finish instead of aborting it.
        self.queues.lock().clear();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    warn!(room = %self.controller.room(), "announcement worker panicked: {}", e);
                }
            }
        }
    }

    pub fn dispatch(&mut self, announcement: Announcement) {
        let Some(src) = announcement.src.clone() else {
            warn!(room = %self.controller.room(), kind = %announcement.kind, "announcement without source");
            return;
        };

        // Sending under the map lock keeps a retiring worker from missing
        // an announcement queued after its last check.
        let mut queues = self.queues.lock();
        let queue = match queues.get(&src) {
            Some(queue) => queue.clone(),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.workers.retain(|worker| !worker.is_finished());
                self.workers.push(tokio::spawn(Self::worker(
                    self.controller.clone(),
                    self.queues.clone(),
                    src.clone(),
                    rx,
                )));
                queues.insert(src.clone(), tx.clone());
                tx
            }
        };

        if queue.send(announcement).is_err() {
            warn!(room = %self.controller.room(), peer = %src, "worker gone, dropping announcement");
        }
    }

    /// Participants that currently hold a queue.
    pub fn queued_peers(&self) -> usize {
        self.queues.lock().len()
    }

    /// Workers still running.
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|worker| !worker.is_finished()).count()
    }

    async fn worker(
        controller: Arc<SignalingController>,
        queues: Queues,
        peer: ParticipantId,
        mut queue: mpsc::UnboundedReceiver<Announcement>,
    ) {
        let mut next = None;
        loop {
            let announcement = match next.take() {
                Some(announcement) => announcement,
                None => match queue.recv().await {
                    Some(announcement) => announcement,
                    None => break,
                },
            };

            let kind = announcement.kind.clone();
            if let Err(e) = controller.handle_announcement(announcement).await {
                warn!(room = %controller.room(), %peer, %kind, "failed to handle announcement: {}", e);
            }

            if kind == AnnouncementKind::Left {
                let mut queues = queues.lock();
                match queue.try_recv() {
                    Ok(announcement) => next = Some(announcement),
                    Err(_) => {
                        queues.remove(&peer);
                        debug!(room = %controller.room(), %peer, "announcement worker retired");
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
