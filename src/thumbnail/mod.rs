//! Thumbnail generation and caching pipeline.
//!
//! Pages are rasterized off the presentation thread by an external poppler
//! process, cached by file fingerprint, and sequenced one at a time by the
//! [`BatchCoordinator`].

mod cache;
mod coordinator;
mod renderer;
mod types;
mod worker;

use std::time::Duration;

pub use cache::{SharedCache, ThumbnailCache, ThumbnailKey};
pub use coordinator::{BatchCoordinator, BatchState, ThumbnailEvent};
pub use renderer::{PageRenderer, PopplerRenderer, RenderError};
pub use types::{Bitmap, CancelToken, ThumbSize};
pub use worker::{RenderJob, WorkerMessage, spawn_render};

/// Maximum cached thumbnails
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

/// Bound on a single external render
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a cancelled worker gets to confirm before being abandoned
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// Default thumbnail target for a file-list grid
pub const DEFAULT_THUMB_SIZE: ThumbSize = ThumbSize::new(140, 180);

/// DPI hint for small grid thumbnails
pub const THUMBNAIL_DPI: u32 = 120;

/// DPI hint for full-width page previews
pub const PREVIEW_DPI: u32 = 150;

/// Pick a render DPI for a given target width, favoring speed for small
/// grid thumbnails
#[must_use]
pub const fn dpi_for_target(target: ThumbSize) -> u32 {
    if target.width < 200 {
        THUMBNAIL_DPI
    } else {
        PREVIEW_DPI
    }
}
