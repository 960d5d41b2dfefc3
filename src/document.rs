//! PDF document probing: page counts and file sizes

use std::path::{Path, PathBuf};

use log::error;
use lopdf::Document;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
}

/// Metadata for one PDF in the merge list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdfInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub file_len: u64,
}

/// Read page count and file size for a single PDF
pub fn probe(path: &Path) -> Result<PdfInfo, DocumentError> {
    let meta = std::fs::metadata(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let doc = Document::load(path).map_err(|source| DocumentError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(PdfInfo {
        path: path.to_path_buf(),
        page_count: doc.get_pages().len(),
        file_len: meta.len(),
    })
}

/// Probe a list of PDFs, logging and skipping the ones that fail
#[must_use]
pub fn probe_batch(paths: &[PathBuf]) -> Vec<PdfInfo> {
    paths
        .iter()
        .filter_map(|path| match probe(path) {
            Ok(info) => Some(info),
            Err(e) => {
                error!("page counting failed: {e}");
                None
            }
        })
        .collect()
}
