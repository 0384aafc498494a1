//! Core types shared by the pipeline, the record store and ingestion

use crate::error::{BlastError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Store-assigned record identifier
pub type RecordId = i64;

/// An encoded image payload with its file name and MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    #[must_use]
    pub fn new<N: Into<String>, M: Into<String>>(name: N, mime_type: M, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a file from disk, guessing its MIME type from the extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).map_err(|e| BlastError::file_io_error("read input", path, &e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BlastError::invalid_config(format!("Input has no file name: {}", path.display()))
            })?;
        let mime_type = mime_type_for_name(&name)
            .or_else(|| sniff_mime_type(&data))
            .unwrap_or("application/octet-stream");

        Ok(Self::new(name, mime_type, data))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A persisted image and, once processed, its background-free counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: RecordId,
    pub source: ImageFile,
    pub processed: Option<ImageFile>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ImageRecord {
    /// A record is pending until the pipeline attaches a processed image
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.processed.is_none()
    }

    #[must_use]
    pub fn status(&self) -> RecordStatus {
        if self.is_pending() {
            RecordStatus::Pending
        } else {
            RecordStatus::Done
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Pending,
    Done,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// What kind of media an input is, decided at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    StillImage,
    VideoClip,
}

impl InputKind {
    /// Classify by MIME type, falling back to the file extension
    #[must_use]
    pub fn detect(file: &ImageFile) -> Option<Self> {
        let mime = if file.mime_type.is_empty() || file.mime_type == "application/octet-stream" {
            mime_type_for_name(&file.name).or_else(|| sniff_mime_type(&file.data))?
        } else {
            file.mime_type.as_str()
        };

        if mime.starts_with("image/") {
            Some(Self::StillImage)
        } else if mime.starts_with("video/") {
            Some(Self::VideoClip)
        } else {
            None
        }
    }
}

/// Per-stage timings of one pipeline run, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "decode {}ms, preprocess {}ms, inference {}ms, postprocess {}ms, encode {}ms, total {}ms",
            self.decode_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.postprocessing_ms,
            self.encode_ms,
            self.total_ms
        )
    }
}

/// Output of the matting pipeline for one image
#[derive(Debug, Clone)]
pub struct MattingResult {
    /// Encoded PNG with the matte in its alpha channel
    pub file: ImageFile,
    /// Pixel dimensions (width, height), equal to the source
    pub dimensions: (u32, u32),
    pub timings: ProcessingTimings,
}

/// MIME type for a file name based on its extension
#[must_use]
pub fn mime_type_for_name(name: &str) -> Option<&'static str> {
    let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => return None,
    };
    Some(mime)
}

/// MIME type from the leading bytes of an image payload
fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .map(|format| format.to_mime_type())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_for_name() {
        assert_eq!(mime_type_for_name("cat.JPG"), Some("image/jpeg"));
        assert_eq!(mime_type_for_name("clip.mp4"), Some("video/mp4"));
        assert_eq!(mime_type_for_name("notes.txt"), None);
        assert_eq!(mime_type_for_name("no_extension"), None);
    }

    #[test]
    fn test_input_kind_detection() {
        let still = ImageFile::new("a.png", "image/png", vec![]);
        let video = ImageFile::new("a.mp4", "video/mp4", vec![]);
        let unknown = ImageFile::new("a.bin", "application/octet-stream", vec![1, 2, 3]);
        let by_name = ImageFile::new("b.webm", "", vec![]);

        assert_eq!(InputKind::detect(&still), Some(InputKind::StillImage));
        assert_eq!(InputKind::detect(&video), Some(InputKind::VideoClip));
        assert_eq!(InputKind::detect(&unknown), None);
        assert_eq!(InputKind::detect(&by_name), Some(InputKind::VideoClip));
    }

    #[test]
    fn test_input_kind_sniffs_unlabelled_png() {
        let png_magic = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let file = ImageFile::new("upload", "application/octet-stream", png_magic);
        assert_eq!(InputKind::detect(&file), Some(InputKind::StillImage));
    }

    #[test]
    fn test_record_status() {
        let mut record = ImageRecord {
            id: 1,
            source: ImageFile::new("a.png", "image/png", vec![1]),
            processed: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        assert_eq!(record.status(), RecordStatus::Pending);
        record.processed = Some(ImageFile::new("a-bg-blasted.png", "image/png", vec![2]));
        assert_eq!(record.status(), RecordStatus::Done);
        assert_eq!(record.status().to_string(), "done");
    }
}
