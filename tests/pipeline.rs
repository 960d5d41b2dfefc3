//! End-to-end tests for the thumbnail pipeline over a substitute renderer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pdfstack::thumbnail::{
    BatchCoordinator, BatchState, Bitmap, CancelToken, PageRenderer, RenderError, ThumbSize,
    ThumbnailCache, ThumbnailEvent,
};

const TARGET: ThumbSize = ThumbSize::new(140, 180);

/// Renderer double with configurable latency and failure injection.
/// Tracks how many renders ran and how many ran at the same time.
struct MockRenderer {
    delay: Duration,
    honor_cancel: bool,
    fail_needle: Option<&'static str>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockRenderer {
    fn instant() -> Self {
        Self::with_delay(Duration::ZERO, true)
    }

    fn with_delay(delay: Duration, honor_cancel: bool) -> Self {
        Self {
            delay,
            honor_cancel,
            fail_needle: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    fn failing_on(needle: &'static str) -> Self {
        let mut renderer = Self::instant();
        renderer.fail_needle = Some(needle);
        renderer
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl PageRenderer for MockRenderer {
    fn render(
        &self,
        path: &Path,
        _page_index: usize,
        target: ThumbSize,
        cancel: &CancelToken,
    ) -> Result<Bitmap, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        let result = (|| {
            let deadline = Instant::now() + self.delay;
            while Instant::now() < deadline {
                if self.honor_cancel && cancel.is_cancelled() {
                    return Err(RenderError::failure("render cancelled"));
                }
                std::thread::sleep(Duration::from_millis(5));
            }

            if let Some(needle) = self.fail_needle {
                if path.to_string_lossy().contains(needle) {
                    return Err(RenderError::failure("malformed PDF"));
                }
            }

            Ok(Bitmap {
                pixels: vec![0x7F; (target.width * target.height * 3) as usize],
                width: target.width,
                height: target.height,
            })
        })();

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn fixture(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Poll the coordinator until `want` events arrived or the timeout elapsed
fn drive(coordinator: &mut BatchCoordinator, want: usize, timeout: Duration) -> Vec<ThumbnailEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while events.len() < want && Instant::now() < deadline {
        events.extend(coordinator.poll_events());
        std::thread::sleep(Duration::from_millis(5));
    }
    events
}

fn event_paths(events: &[ThumbnailEvent]) -> Vec<PathBuf> {
    events.iter().map(|e| e.path().clone()).collect()
}

#[test]
fn batch_reports_every_file_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..4)
        .map(|i| fixture(dir.path(), &format!("doc{i}.pdf"), format!("%PDF {i}").as_bytes()))
        .collect();

    let renderer = Arc::new(MockRenderer::with_delay(Duration::from_millis(20), true));
    let mut coordinator =
        BatchCoordinator::new(renderer.clone(), ThumbnailCache::shared(10));

    coordinator.submit_batch(paths.clone(), TARGET);
    let events = drive(&mut coordinator, 4, Duration::from_secs(5));

    assert_eq!(events.len(), 4);
    assert_eq!(event_paths(&events), paths);
    assert!(events.iter().all(|e| matches!(e, ThumbnailEvent::Ready { .. })));
    assert_eq!(renderer.max_active(), 1);
    assert!(coordinator.is_idle());
}

#[test]
fn failed_file_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let ok1 = fixture(dir.path(), "f1.pdf", b"%PDF f1");
    let bad = fixture(dir.path(), "f2-corrupt.pdf", b"garbage");
    let ok2 = fixture(dir.path(), "f3.pdf", b"%PDF f3");

    let renderer = Arc::new(MockRenderer::failing_on("corrupt"));
    let mut coordinator = BatchCoordinator::new(renderer, ThumbnailCache::shared(10));

    coordinator.submit_batch(vec![ok1.clone(), bad.clone(), ok2.clone()], TARGET);
    let events = drive(&mut coordinator, 3, Duration::from_secs(5));

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], ThumbnailEvent::Ready { path, .. } if *path == ok1));
    assert!(matches!(&events[1], ThumbnailEvent::Failed { path, error }
        if *path == bad && !error.is_timeout()));
    assert!(matches!(&events[2], ThumbnailEvent::Ready { path, .. } if *path == ok2));
    assert!(coordinator.is_idle());
}

#[test]
fn identical_bytes_at_different_paths_are_cached_independently() {
    let dir = tempfile::tempdir().unwrap();
    let a = fixture(dir.path(), "a.pdf", b"%PDF same bytes");
    let b = fixture(dir.path(), "b.pdf", b"%PDF same bytes");

    let renderer = Arc::new(MockRenderer::instant());
    let mut coordinator =
        BatchCoordinator::new(renderer.clone(), ThumbnailCache::shared(10));

    coordinator.submit_batch(vec![a, b], TARGET);
    let events = drive(&mut coordinator, 2, Duration::from_secs(5));

    assert_eq!(events.len(), 2);
    // Fingerprint is path + metadata, not content: both files rendered
    assert_eq!(renderer.calls(), 2);
}

#[test]
fn resubmitted_batch_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let a = fixture(dir.path(), "a.pdf", b"%PDF a");

    let renderer = Arc::new(MockRenderer::instant());
    let mut coordinator =
        BatchCoordinator::new(renderer.clone(), ThumbnailCache::shared(10));

    coordinator.submit_batch(vec![a.clone()], TARGET);
    let first = drive(&mut coordinator, 1, Duration::from_secs(5));
    assert_eq!(first.len(), 1);
    assert_eq!(renderer.calls(), 1);

    coordinator.submit_batch(vec![a], TARGET);
    let second = drive(&mut coordinator, 1, Duration::from_secs(5));
    assert_eq!(second.len(), 1);
    assert!(matches!(second[0], ThumbnailEvent::Ready { .. }));
    // Cache hit, no second render
    assert_eq!(renderer.calls(), 1);
}

#[test]
fn cancel_mid_batch_reaches_idle_within_grace() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..3)
        .map(|i| fixture(dir.path(), &format!("slow{i}.pdf"), b"%PDF"))
        .collect();

    // Worker ignores cancellation, forcing the grace timeout path
    let renderer = Arc::new(MockRenderer::with_delay(Duration::from_millis(400), false));
    let grace = Duration::from_millis(100);
    let mut coordinator =
        BatchCoordinator::with_stop_grace(renderer, ThumbnailCache::shared(10), grace);

    coordinator.submit_batch(paths, TARGET);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(coordinator.state(), BatchState::Running);

    let started = Instant::now();
    coordinator.cancel();
    let elapsed = started.elapsed();

    assert!(coordinator.is_idle());
    assert!(
        elapsed < grace + Duration::from_millis(300),
        "cancel took {elapsed:?}"
    );

    // The abandoned worker eventually finishes; its result must be
    // discarded, and the unstarted files must never produce events
    std::thread::sleep(Duration::from_millis(500));
    assert!(coordinator.poll_events().is_empty());
    assert!(coordinator.is_idle());
}

#[test]
fn new_batch_supersedes_a_running_one() {
    let dir = tempfile::tempdir().unwrap();
    let old: Vec<PathBuf> = (0..3)
        .map(|i| fixture(dir.path(), &format!("old{i}.pdf"), b"%PDF"))
        .collect();
    let replacement = fixture(dir.path(), "new.pdf", b"%PDF new");

    let renderer = Arc::new(MockRenderer::with_delay(Duration::from_millis(200), true));
    let mut coordinator = BatchCoordinator::new(renderer, ThumbnailCache::shared(10));

    coordinator.submit_batch(old.clone(), TARGET);
    std::thread::sleep(Duration::from_millis(20));
    coordinator.submit_batch(vec![replacement.clone()], TARGET);

    let events = drive(&mut coordinator, 1, Duration::from_secs(5));
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], ThumbnailEvent::Ready { path, .. } if *path == replacement));

    // Nothing from the superseded batch leaks through afterwards
    std::thread::sleep(Duration::from_millis(300));
    assert!(coordinator.poll_events().is_empty());
    assert!(coordinator.is_idle());
}

#[test]
fn empty_batch_is_a_no_op() {
    let renderer = Arc::new(MockRenderer::instant());
    let mut coordinator =
        BatchCoordinator::new(renderer.clone(), ThumbnailCache::shared(10));

    coordinator.submit_batch(Vec::new(), TARGET);

    assert!(coordinator.is_idle());
    assert!(coordinator.poll_events().is_empty());
    assert_eq!(renderer.calls(), 0);
}
