//! PDF merge: a direct pass-through over lopdf's page tree.
//!
//! No page manipulation happens here; input pages are concatenated in
//! submission order into a fresh document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use flume::Receiver;
use log::{error, info};
use lopdf::{Document, Object, ObjectId};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("nothing to merge")]
    NoInputs,

    #[error("cannot load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("inputs contain no pages")]
    NoPages,

    #[error("inputs contain no document catalog")]
    NoCatalog,

    #[error("cannot create output directory: {source}")]
    OutputDir {
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write merged output: {detail}")]
    Save { detail: String },
}

/// Progress report from a background merge
#[derive(Debug)]
pub enum MergeEvent {
    /// Percent of input files folded in so far
    Progress(u8),
    Finished(PathBuf),
    Failed(String),
}

/// Merge the given PDFs into `output`, reporting integer-percent progress
/// after each input file.
///
/// Returns the output path on success. The output file is not written at
/// all when the merge fails.
pub fn merge_files<F>(
    inputs: &[PathBuf],
    output: &Path,
    mut progress: F,
) -> Result<PathBuf, MergeError>
where
    F: FnMut(u8),
{
    if inputs.is_empty() {
        return Err(MergeError::NoInputs);
    }

    let total = inputs.len();
    info!("merging {total} PDF(s) into {}", output.display());

    let mut merged = Document::with_version("1.5");
    let mut max_id = 1;
    // Page objects in submission order; object ids elsewhere carry no
    // ordering guarantee
    let mut all_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut all_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (index, path) in inputs.iter().enumerate() {
        let mut doc = Document::load(path).map_err(|source| MergeError::Load {
            path: path.clone(),
            source,
        })?;

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, page_id) in doc.get_pages() {
            if let Ok(object) = doc.get_object(page_id) {
                all_pages.push((page_id, object.to_owned()));
            }
        }
        all_objects.extend(doc.objects);

        info!("added PDF {}/{total}: {}", index + 1, path.display());
        progress((((index + 1) * 100) / total) as u8);
    }

    // Fold all catalogs into one and all pages roots into one; everything
    // else is carried over verbatim.
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut pages_root: Option<(ObjectId, Object)> = None;

    for (object_id, object) in &all_objects {
        match object_kind(object) {
            Some(b"Catalog") => {
                let id = catalog.as_ref().map_or(*object_id, |(id, _)| *id);
                catalog = Some((id, object.clone()));
            }
            Some(b"Pages") => {
                if let Ok(dict) = object.as_dict() {
                    let mut dict = dict.clone();
                    if let Some((_, ref existing)) = pages_root {
                        if let Ok(existing) = existing.as_dict() {
                            dict.extend(existing);
                        }
                    }
                    let id = pages_root.as_ref().map_or(*object_id, |(id, _)| *id);
                    pages_root = Some((id, Object::Dictionary(dict)));
                }
            }
            // Re-parented below / dropped: outlines spanning documents
            // would dangle
            Some(b"Page" | b"Outlines" | b"Outline") => {}
            _ => {
                merged.objects.insert(*object_id, object.clone());
            }
        }
    }

    let (pages_root_id, pages_root_obj) = pages_root.ok_or(MergeError::NoPages)?;
    let (catalog_id, catalog_obj) = catalog.ok_or(MergeError::NoCatalog)?;
    if all_pages.is_empty() {
        return Err(MergeError::NoPages);
    }

    for (page_id, object) in &all_pages {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_root_id);
            merged.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    if let Ok(dict) = pages_root_obj.as_dict() {
        let mut dict = dict.clone();
        dict.set("Count", all_pages.len() as u32);
        dict.set(
            "Kids",
            all_pages
                .iter()
                .map(|(page_id, _)| Object::Reference(*page_id))
                .collect::<Vec<_>>(),
        );
        merged.objects.insert(pages_root_id, Object::Dictionary(dict));
    }

    if let Ok(dict) = catalog_obj.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", pages_root_id);
        dict.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(dict));
    }

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|source| MergeError::OutputDir { source })?;
    }
    merged
        .save(output)
        .map_err(|e| MergeError::Save {
            detail: e.to_string(),
        })?;

    info!("merge completed: {}", output.display());
    Ok(output.to_path_buf())
}

/// Run the merge on a background thread, streaming [`MergeEvent`]s
#[must_use]
pub fn spawn(inputs: Vec<PathBuf>, output: PathBuf) -> (JoinHandle<()>, Receiver<MergeEvent>) {
    let (tx, rx) = flume::unbounded();

    let handle = std::thread::Builder::new()
        .name("pdf-merge".into())
        .spawn(move || {
            let progress_tx = tx.clone();
            let result = merge_files(&inputs, &output, |pct| {
                let _ = progress_tx.send(MergeEvent::Progress(pct));
            });
            let _ = match result {
                Ok(path) => tx.send(MergeEvent::Finished(path)),
                Err(e) => {
                    error!("merge failed: {e}");
                    tx.send(MergeEvent::Failed(e.to_string()))
                }
            };
        })
        .expect("failed to spawn merge thread");

    (handle, rx)
}

fn object_kind(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}
