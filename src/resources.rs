//! Runtime path resolution for bundled resources and the poppler toolchain.
//!
//! The application runs either from the source tree (`cargo run`, tests) or
//! as a packaged artifact with poppler bundled next to the executable. All
//! lookups resolve relative to the actual runtime location, not the caller's
//! working directory.

use std::path::PathBuf;

use log::debug;

/// Directory name of a poppler install bundled next to the executable
const BUNDLED_POPPLER: &str = "poppler/bin";

/// Layout of a poppler release archive unpacked into the source tree
const SOURCE_TREE_POPPLER: &str = "poppler-23.11.0/Library/bin";

/// Base directory of the running application: the executable's directory,
/// falling back to the current working directory
#[must_use]
pub fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory for bundled assets (icons etc.), created on first use
pub fn assets_dir() -> std::io::Result<PathBuf> {
    let dir = base_dir().join("assets");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Locate the poppler binary directory.
///
/// Search order: bundled next to the executable, an unpacked release in the
/// source tree, the `POPPLER_PATH` environment variable, then well-known
/// Windows install locations. `None` means `pdftoppm` must be resolvable
/// from `PATH`.
#[must_use]
pub fn poppler_dir() -> Option<PathBuf> {
    let base = base_dir();

    let bundled = base.join(BUNDLED_POPPLER);
    if bundled.is_dir() {
        debug!("using bundled poppler at {}", bundled.display());
        return Some(bundled);
    }

    let source_local = base.join(SOURCE_TREE_POPPLER);
    if source_local.is_dir() {
        debug!("using source-tree poppler at {}", source_local.display());
        return Some(source_local);
    }

    if let Ok(env_path) = std::env::var("POPPLER_PATH") {
        let dir = PathBuf::from(env_path);
        if dir.is_dir() {
            debug!("using POPPLER_PATH poppler at {}", dir.display());
            return Some(dir);
        }
    }

    #[cfg(windows)]
    {
        let mut candidates = vec![
            PathBuf::from(r"C:\Program Files\poppler-23.11.0\Library\bin"),
            PathBuf::from(r"C:\Program Files\poppler\bin"),
            PathBuf::from(r"C:\poppler\bin"),
        ];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join("poppler").join("bin"));
        }
        for dir in candidates {
            if dir.is_dir() {
                debug!("using system poppler at {}", dir.display());
                return Some(dir);
            }
        }
    }

    None
}
