//! Batch coordinator - sequences thumbnail jobs one at a time

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use super::cache::SharedCache;
use super::renderer::{PageRenderer, RenderError};
use super::types::{Bitmap, CancelToken, ThumbSize};
use super::worker::{RenderJob, WorkerMessage, spawn_render};
use super::{DEFAULT_THUMB_SIZE, STOP_GRACE};

/// Per-file outcome delivered to the presentation layer, in submission order
#[derive(Debug)]
pub enum ThumbnailEvent {
    Ready {
        path: PathBuf,
        thumbnail: Arc<Bitmap>,
    },
    Failed {
        path: PathBuf,
        error: RenderError,
    },
}

impl ThumbnailEvent {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Ready { path, .. } | Self::Failed { path, .. } => path,
        }
    }
}

/// Coordinator lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    /// Queue empty, no worker active
    Idle,
    /// One worker active for the head-of-queue file
    Running,
    /// Stop requested, waiting out the grace period
    Cancelling,
}

struct ActiveJob {
    path: PathBuf,
    generation: u64,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// Sequences thumbnail requests strictly front-to-back with at most one
/// worker in flight.
///
/// Rendering fans out to a heavyweight child process per job, so concurrency
/// is fixed at one in-flight render. The host drives the coordinator by
/// calling [`poll_events`](Self::poll_events) from its event loop; results
/// come back in submission order.
pub struct BatchCoordinator {
    queue: VecDeque<PathBuf>,
    target: ThumbSize,
    state: BatchState,
    /// Bumped whenever a batch is superseded; responses from older
    /// generations are discarded, not reported
    generation: u64,
    active: Option<ActiveJob>,
    renderer: Arc<dyn PageRenderer>,
    cache: SharedCache,
    stop_grace: Duration,
    response_tx: Sender<WorkerMessage>,
    response_rx: Receiver<WorkerMessage>,
}

impl BatchCoordinator {
    /// Create a coordinator with the default stop grace period
    #[must_use]
    pub fn new(renderer: Arc<dyn PageRenderer>, cache: SharedCache) -> Self {
        Self::with_stop_grace(renderer, cache, STOP_GRACE)
    }

    #[must_use]
    pub fn with_stop_grace(
        renderer: Arc<dyn PageRenderer>,
        cache: SharedCache,
        stop_grace: Duration,
    ) -> Self {
        let (response_tx, response_rx) = flume::unbounded();
        Self {
            queue: VecDeque::new(),
            target: DEFAULT_THUMB_SIZE,
            state: BatchState::Idle,
            generation: 0,
            active: None,
            renderer,
            cache,
            stop_grace,
            response_tx,
            response_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> BatchState {
        self.state
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == BatchState::Idle
    }

    /// Files still queued, including the one in flight
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Shared thumbnail cache, for presentation-side lookups
    #[must_use]
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Queue a new batch, superseding any batch currently running.
    ///
    /// A running batch is first forced through `Cancelling`; its unstarted
    /// files are dropped and its in-flight result, if any, is discarded.
    pub fn submit_batch(&mut self, paths: Vec<PathBuf>, target: ThumbSize) {
        if self.state != BatchState::Idle {
            self.cancel();
        }

        info!("starting thumbnail batch of {} file(s)", paths.len());
        self.generation += 1;
        self.queue = paths.into();
        self.target = target;
        self.start_next();
    }

    /// Stop the current batch.
    ///
    /// The active worker is asked to stop and given the grace period to
    /// confirm. If it does not, the coordinator logs the overrun and
    /// proceeds to `Idle` anyway; the orphaned worker's eventual result is
    /// discarded by the generation check.
    pub fn cancel(&mut self) {
        if self.state == BatchState::Idle {
            return;
        }

        self.state = BatchState::Cancelling;
        // Anything still in flight is now stale
        self.generation += 1;

        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            self.await_stop(active);
        }

        self.queue.clear();
        self.state = BatchState::Idle;
    }

    /// Drain completed jobs, emitting per-file events in submission order
    /// and starting the next queued job after each completion.
    pub fn poll_events(&mut self) -> Vec<ThumbnailEvent> {
        let mut events = Vec::new();

        while let Ok(message) = self.response_rx.try_recv() {
            if message.generation() != self.generation {
                debug!("discarding stale worker response");
                continue;
            }

            if let Some(active) = self.active.take() {
                // The worker sent its terminal message, so this join is
                // immediate
                let _ = active.handle.join();
            }
            self.queue.pop_front();

            events.push(match message {
                WorkerMessage::Ready {
                    path, thumbnail, ..
                } => ThumbnailEvent::Ready { path, thumbnail },
                WorkerMessage::Failed { path, error, .. } => {
                    warn!("thumbnail failed for {}: {error}", path.display());
                    ThumbnailEvent::Failed { path, error }
                }
            });

            self.start_next();
        }

        events
    }

    fn start_next(&mut self) {
        debug_assert!(self.active.is_none(), "only one worker may be in flight");

        let Some(path) = self.queue.front().cloned() else {
            if self.state != BatchState::Idle {
                info!("thumbnail batch complete");
            }
            self.state = BatchState::Idle;
            return;
        };

        let job = RenderJob {
            path: path.clone(),
            target: self.target,
            generation: self.generation,
            cancel: CancelToken::new(),
        };
        let cancel = job.cancel.clone();
        let handle = spawn_render(
            job,
            Arc::clone(&self.renderer),
            Arc::clone(&self.cache),
            self.response_tx.clone(),
        );

        self.active = Some(ActiveJob {
            path,
            generation: self.generation,
            cancel,
            handle,
        });
        self.state = BatchState::Running;
    }

    // Wait out the grace period for the cancelled worker's terminal message.
    fn await_stop(&mut self, active: ActiveJob) {
        let deadline = Instant::now() + self.stop_grace;

        loop {
            match self.response_rx.recv_deadline(deadline) {
                Ok(message) if message.generation() == active.generation => {
                    debug!("worker confirmed stop for {}", active.path.display());
                    let _ = active.handle.join();
                    return;
                }
                // Older stale message, keep draining
                Ok(_) => {}
                Err(_) => {
                    warn!(
                        "worker for {} did not stop within {:?}, abandoning it",
                        active.path.display(),
                        self.stop_grace
                    );
                    return;
                }
            }
        }
    }
}

impl Drop for BatchCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}
