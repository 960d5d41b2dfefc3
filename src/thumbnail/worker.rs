//! Thumbnail render worker - one background thread per job

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use flume::Sender;
use log::debug;

use super::cache::{SharedCache, ThumbnailKey};
use super::renderer::{PageRenderer, RenderError};
use super::types::{Bitmap, CancelToken, ThumbSize};

/// One in-flight thumbnail request
#[derive(Clone, Debug)]
pub struct RenderJob {
    /// Source file path
    pub path: PathBuf,
    /// Target dimensions
    pub target: ThumbSize,
    /// Batch generation this job belongs to; stale results are discarded
    pub generation: u64,
    /// Cooperative stop flag
    pub cancel: CancelToken,
}

/// Terminal report from a worker, exactly one per job
#[derive(Debug)]
pub enum WorkerMessage {
    Ready {
        generation: u64,
        path: PathBuf,
        thumbnail: Arc<Bitmap>,
    },
    Failed {
        generation: u64,
        path: PathBuf,
        error: RenderError,
    },
}

impl WorkerMessage {
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Ready { generation, .. } | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// Spawn a thread that renders one thumbnail and reports back over `tx`.
///
/// The cache is consulted first; a hit never touches the external renderer.
/// On a successful cache-miss render exactly one entry is inserted. Failures
/// leave the cache untouched.
pub fn spawn_render(
    job: RenderJob,
    renderer: Arc<dyn PageRenderer>,
    cache: SharedCache,
    tx: Sender<WorkerMessage>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("thumbnail-render".into())
        .spawn(move || {
            let message = run_job(&job, renderer.as_ref(), &cache);
            // Receiver gone means the coordinator is shutting down
            let _ = tx.send(message);
        })
        .expect("failed to spawn render worker thread")
}

fn run_job(job: &RenderJob, renderer: &dyn PageRenderer, cache: &SharedCache) -> WorkerMessage {
    let key = match ThumbnailKey::probe(&job.path, job.target) {
        Ok(key) => key,
        Err(e) => {
            return WorkerMessage::Failed {
                generation: job.generation,
                path: job.path.clone(),
                error: RenderError::failure(format!("cannot stat {}: {e}", job.path.display())),
            };
        }
    };

    let cached = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key);
    if let Some(thumbnail) = cached {
        debug!("thumbnail cache hit for {}", job.path.display());
        return WorkerMessage::Ready {
            generation: job.generation,
            path: job.path.clone(),
            thumbnail,
        };
    }

    match renderer.render(&job.path, 0, job.target, &job.cancel) {
        Ok(bitmap) => {
            let thumbnail = cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, bitmap);
            WorkerMessage::Ready {
                generation: job.generation,
                path: job.path.clone(),
                thumbnail,
            }
        }
        Err(error) => WorkerMessage::Failed {
            generation: job.generation,
            path: job.path.clone(),
            error,
        },
    }
}
