//! Turning user input into pending records

use crate::{
    error::{BlastError, Result},
    store::RecordStore,
    types::{ImageFile, InputKind, RecordId},
};
use std::path::Path;
use tracing::info;

/// Classify and persist one submitted file as a pending record
///
/// # Errors
/// - `Unsupported` for video clips and unrecognised payloads
/// - `Store` when the insert fails
pub fn ingest(store: &dyn RecordStore, file: ImageFile) -> Result<RecordId> {
    match InputKind::detect(&file) {
        Some(InputKind::StillImage) => {
            let id = store.insert(file)?;
            info!(id, "Queued image for background removal");
            Ok(id)
        },
        Some(InputKind::VideoClip) => Err(BlastError::unsupported(format!(
            "'{}' is a video clip ({}); only still images are processed",
            file.name, file.mime_type
        ))),
        None => Err(BlastError::unsupported(format!(
            "'{}' is not a recognised image ({})",
            file.name, file.mime_type
        ))),
    }
}

/// Read an input file from disk
///
/// # Errors
/// - `Io` when the file cannot be read
pub fn load_input<P: AsRef<Path>>(path: P) -> Result<ImageFile> {
    ImageFile::from_path(path)
}
