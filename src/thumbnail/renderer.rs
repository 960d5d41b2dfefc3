//! External renderer adapter over poppler's `pdftoppm`

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};
use tempfile::TempDir;

use super::RENDER_TIMEOUT;
use super::types::{Bitmap, CancelToken, ThumbSize};
use crate::resources;
use crate::settings::Settings;

#[cfg(windows)]
const PDFTOPPM_EXE: &str = "pdftoppm.exe";
#[cfg(not(windows))]
const PDFTOPPM_EXE: &str = "pdftoppm";

/// How often the child process is polled for exit/cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// CREATE_NO_WINDOW, keeps spawned children from flashing a console
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Errors from the external render toolchain
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    #[error("render timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("{detail}")]
    Failure { detail: String },
}

impl RenderError {
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure { detail: msg.into() }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Rasterizes one page of a PDF to a bitmap.
///
/// The trait is the seam between the worker and the external toolchain;
/// tests substitute it with recording/failing implementations.
pub trait PageRenderer: Send + Sync {
    fn render(
        &self,
        path: &Path,
        page_index: usize,
        target: ThumbSize,
        cancel: &CancelToken,
    ) -> Result<Bitmap, RenderError>;
}

/// `PageRenderer` backed by poppler's `pdftoppm` run as a child process.
///
/// The child is owned for its whole lifetime: on timeout or cancellation it
/// is killed and reaped, never left to the OS.
pub struct PopplerRenderer {
    poppler_dir: Option<PathBuf>,
    timeout: Duration,
    suppress_console: bool,
}

impl PopplerRenderer {
    /// Create a renderer with the default timeout, resolving bundled poppler
    /// binaries relative to the running executable
    #[must_use]
    pub fn new() -> Self {
        Self {
            poppler_dir: resources::poppler_dir(),
            timeout: RENDER_TIMEOUT,
            suppress_console: false,
        }
    }

    /// Create a renderer configured from settings. An explicit
    /// `poppler_dir` in the settings wins over runtime resolution.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poppler_dir: settings
                .poppler_dir
                .clone()
                .or_else(resources::poppler_dir),
            timeout: settings.render_timeout(),
            suppress_console: settings.suppress_console,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn pdftoppm_command(&self) -> Command {
        let program = match &self.poppler_dir {
            Some(dir) => dir.join(PDFTOPPM_EXE),
            None => PathBuf::from(PDFTOPPM_EXE),
        };

        let mut cmd = Command::new(program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        if self.suppress_console {
            use std::os::windows::process::CommandExt;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }

    /// Wait for the child, bounded by the timeout and the cancel token.
    /// Kills and reaps the child on either bound.
    fn wait_bounded(
        &self,
        child: &mut Child,
        cancel: &CancelToken,
    ) -> Result<std::process::ExitStatus, RenderError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    kill_and_reap(child);
                    return Err(RenderError::failure(format!(
                        "failed waiting on pdftoppm: {e}"
                    )));
                }
            }

            if cancel.is_cancelled() {
                debug!("render cancelled, killing pdftoppm");
                kill_and_reap(child);
                return Err(RenderError::failure("render cancelled"));
            }

            if Instant::now() >= deadline {
                warn!("pdftoppm exceeded {:?}, killing", self.timeout);
                kill_and_reap(child);
                return Err(RenderError::Timeout {
                    timeout: self.timeout,
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl PopplerRenderer {
    /// Render a page range at a fixed DPI, for the full-width preview panel.
    ///
    /// Pages are numbered from 1. The whole range shares one child process
    /// and one timeout bound.
    pub fn render_range(
        &self,
        path: &Path,
        first_page: usize,
        last_page: usize,
        dpi: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Bitmap>, RenderError> {
        if first_page == 0 || last_page < first_page {
            return Err(RenderError::failure(format!(
                "invalid page range {first_page}..={last_page}"
            )));
        }

        let scratch = TempDir::new()
            .map_err(|e| RenderError::failure(format!("failed to create scratch dir: {e}")))?;
        let prefix = scratch.path().join("page");

        let mut cmd = self.pdftoppm_command();
        cmd.arg("-png")
            .args(["-f", &first_page.to_string()])
            .args(["-l", &last_page.to_string()])
            .args(["-r", &dpi.to_string()])
            .arg(path)
            .arg(&prefix);

        let mut child = cmd
            .spawn()
            .map_err(|e| RenderError::failure(format!("failed to spawn pdftoppm: {e}")))?;
        let status = self.wait_bounded(&mut child, cancel)?;

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(RenderError::failure(format!(
                "pdftoppm exited with {status}: {}",
                stderr.trim()
            )));
        }

        let mut pages = Vec::with_capacity(last_page - first_page + 1);
        for page in first_page..=last_page {
            let Some(output) = find_output_png_exact(scratch.path(), page) else {
                // Short documents legitimately end before last_page
                break;
            };
            let img = image::open(&output)
                .map_err(|e| RenderError::failure(format!("failed to decode page {page}: {e}")))?
                .into_rgb8();
            let (width, height) = img.dimensions();
            pages.push(Bitmap {
                pixels: img.into_raw(),
                width,
                height,
            });
        }

        if pages.is_empty() {
            return Err(RenderError::failure("pdftoppm produced no pages"));
        }
        Ok(pages)
    }
}

impl Default for PopplerRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for PopplerRenderer {
    fn render(
        &self,
        path: &Path,
        page_index: usize,
        target: ThumbSize,
        cancel: &CancelToken,
    ) -> Result<Bitmap, RenderError> {
        let scratch = TempDir::new()
            .map_err(|e| RenderError::failure(format!("failed to create scratch dir: {e}")))?;
        let prefix = scratch.path().join("page");

        // pdftoppm numbers pages from 1
        let page = page_index + 1;

        let mut cmd = self.pdftoppm_command();
        cmd.arg("-png")
            .args(["-f", &page.to_string()])
            .args(["-l", &page.to_string()])
            .args(["-scale-to-x", &target.width.to_string()])
            .args(["-scale-to-y", &target.height.to_string()])
            .arg(path)
            .arg(&prefix);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::failure(
                    "pdftoppm not found; install poppler or set POPPLER_PATH",
                )
            } else {
                RenderError::failure(format!("failed to spawn pdftoppm: {e}"))
            }
        })?;

        let status = self.wait_bounded(&mut child, cancel)?;

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(RenderError::failure(format!(
                "pdftoppm exited with {status}: {}",
                stderr.trim()
            )));
        }

        let output = find_output_png(scratch.path(), page).ok_or_else(|| {
            RenderError::failure(format!("pdftoppm produced no output for page {page}"))
        })?;

        let img = image::open(&output)
            .map_err(|e| RenderError::failure(format!("failed to decode rendered page: {e}")))?
            .into_rgb8();

        let (width, height) = img.dimensions();
        Ok(Bitmap {
            pixels: img.into_raw(),
            width,
            height,
        })
    }
}

// pdftoppm zero-pads the page suffix based on the document's page count, so
// try the plain name first and fall back to scanning the scratch dir.
fn find_output_png(dir: &Path, page: usize) -> Option<PathBuf> {
    if let Some(found) = find_output_png_exact(dir, page) {
        return Some(found);
    }

    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|p| p.extension().is_some_and(|ext| ext == "png"))
}

fn find_output_png_exact(dir: &Path, page: usize) -> Option<PathBuf> {
    for name in [
        format!("page-{page}.png"),
        format!("page-{page:02}.png"),
        format!("page-{page:03}.png"),
    ] {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
