//! pdfstack - PDF merging core with a poppler-backed thumbnail pipeline.
//!
//! The GUI shell is a separate crate; this library owns everything below
//! the presentation layer: document probing, the merge pass-through, and
//! the thumbnail generation/caching pipeline.

pub mod document;
pub mod logging;
pub mod merge;
pub mod resources;
pub mod settings;
pub mod thumbnail;

pub use document::{DocumentError, PdfInfo};
pub use merge::{MergeError, MergeEvent};
pub use settings::{Settings, SettingsError};
pub use thumbnail::{
    BatchCoordinator, BatchState, Bitmap, CancelToken, PageRenderer, PopplerRenderer, RenderError,
    ThumbSize, ThumbnailCache, ThumbnailEvent, ThumbnailKey,
};
