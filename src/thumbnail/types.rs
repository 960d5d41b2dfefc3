//! Core types for thumbnail rendering

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Target thumbnail dimensions in pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThumbSize {
    pub width: u32,
    pub height: u32,
}

impl ThumbSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Decoded page bitmap (3 bytes per pixel: R, G, B)
#[derive(Clone)]
pub struct Bitmap {
    /// Raw RGB pixel data
    pub pixels: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Bitmap {
    /// Byte length expected for the stated dimensions
    #[must_use]
    pub const fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixels_len", &self.pixels.len())
            .finish()
    }
}

/// Cooperative cancellation flag shared between a coordinator and its worker.
///
/// Cancellation is advisory: the worker (and the renderer child process it
/// owns) checks the flag at its next suspension point. Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_sticky_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
        assert!(token.is_cancelled());
    }

    #[test]
    fn bitmap_debug_omits_pixels() {
        let bitmap = Bitmap {
            pixels: vec![0; 12],
            width: 2,
            height: 2,
        };
        let repr = format!("{bitmap:?}");
        assert!(repr.contains("pixels_len"));
        assert_eq!(bitmap.expected_len(), 12);
    }
}
