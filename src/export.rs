//! Bulk export of processed images

use crate::{
    error::{BlastError, Result},
    store::RecordStore,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default export folder name
pub const DEFAULT_EXPORT_DIR: &str = "background-blasted";

/// What an export wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: Vec<PathBuf>,
    pub skipped_pending: usize,
}

/// Write every processed image in the store into `dir`
///
/// Files are written most recent first. When two records share a processed
/// name, later ones get `-<id>` before the extension. Pending records are
/// skipped and counted.
///
/// # Errors
/// - `Store` when the records cannot be listed
/// - `Io` when the directory or a file cannot be written
pub fn export_processed(store: &dyn RecordStore, dir: &Path) -> Result<ExportSummary> {
    std::fs::create_dir_all(dir)
        .map_err(|e| BlastError::file_io_error("create export directory", dir, &e))?;

    let mut summary = ExportSummary::default();
    let mut used_names = HashSet::new();

    for record in store.list_most_recent_first()? {
        let Some(processed) = record.processed else {
            summary.skipped_pending += 1;
            continue;
        };

        let name = unique_name(&sanitize_file_name(&processed.name), record.id, &mut used_names);
        let path = dir.join(&name);
        std::fs::write(&path, &processed.data)
            .map_err(|e| BlastError::file_io_error("write exported image", &path, &e))?;
        debug!(id = record.id, path = %path.display(), "Exported image");
        summary.written.push(path);
    }

    info!(
        written = summary.written.len(),
        skipped_pending = summary.skipped_pending,
        dir = %dir.display(),
        "Export complete"
    );
    Ok(summary)
}

fn unique_name(name: &str, id: i64, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let candidate = match path.extension() {
        Some(ext) => format!("{stem}-{id}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{id}"),
    };
    used.insert(candidate.clone());
    candidate
}

/// Keep only the final path component of a stored name
fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "image.png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteRecordStore;
    use crate::types::ImageFile;

    fn file(name: &str, byte: u8) -> ImageFile {
        ImageFile::new(name, "image/png", vec![byte])
    }

    #[test]
    fn test_export_writes_processed_and_skips_pending() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let done = store.insert(file("a.png", 1)).unwrap();
        store.insert(file("b.png", 2)).unwrap();
        store.set_processed(done, file("a-bg-blasted.png", 7)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join(DEFAULT_EXPORT_DIR);
        let summary = export_processed(&store, &out).unwrap();

        assert_eq!(summary.skipped_pending, 1);
        assert_eq!(summary.written, vec![out.join("a-bg-blasted.png")]);
        assert_eq!(std::fs::read(out.join("a-bg-blasted.png")).unwrap(), vec![7]);
    }

    #[test]
    fn test_duplicate_names_get_record_id() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let first = store.insert(file("cat.png", 1)).unwrap();
        let second = store.insert(file("cat.png", 2)).unwrap();
        store.set_processed(first, file("cat-bg-blasted.png", 1)).unwrap();
        store.set_processed(second, file("cat-bg-blasted.png", 2)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let summary = export_processed(&store, dir.path()).unwrap();

        // Most recent first keeps the plain name
        assert_eq!(summary.written[0], dir.path().join("cat-bg-blasted.png"));
        assert_eq!(
            summary.written[1],
            dir.path().join(format!("cat-bg-blasted-{first}.png"))
        );
        assert_eq!(std::fs::read(&summary.written[0]).unwrap(), vec![2]);
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(""), "image.png");
    }
}
