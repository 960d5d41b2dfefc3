//! File logger installation for host applications

use std::fs::File;
use std::path::Path;

use anyhow::Result;
use log::LevelFilter;
use simplelog::{Config, WriteLogger};

/// Install a file-backed logger. Call once at startup, before constructing
/// any coordinator.
pub fn init_file_logging(path: impl AsRef<Path>, level: LevelFilter) -> Result<()> {
    WriteLogger::init(level, Config::default(), File::create(path.as_ref())?)?;
    log::info!("logging initialized at {}", path.as_ref().display());
    Ok(())
}
