//! Model downloading from `HuggingFace` repositories
//!
//! Files are streamed into a temporary folder next to the models directory
//! and moved into place with a single rename once every required file has
//! arrived. Each ONNX file gets a `.sha256` sidecar so a later run can tell
//! a complete download from a truncated one.

use crate::config::repo_dir_name;
use crate::error::{BlastError, Result};
use crate::models::{ModelManager, CONFIG_FILES, ONNX_VARIANTS};
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

const HUGGINGFACE_BASE: &str = "https://huggingface.co/";

/// Configuration files that must download for a usable model
const REQUIRED_FILES: &[&str] = &["preprocessor_config.json"];

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }
}

/// Fetches model folders into a local models directory
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    models_dir: PathBuf,
}

impl ModelDownloader {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new<P: Into<PathBuf>>(models_dir: P) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BlastError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            models_dir: models_dir.into(),
        })
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Local folder a repository is stored in
    #[must_use]
    pub fn model_path(&self, repo: &str) -> PathBuf {
        self.models_dir.join(repo_dir_name(repo))
    }

    /// Make sure `repo` is present locally, downloading it if needed
    ///
    /// `repo` is either `owner/name` or a full `https://huggingface.co/owner/name` URL.
    /// Returns the model folder.
    ///
    /// # Errors
    /// - Invalid repository id
    /// - Network errors during download
    /// - File system errors while placing the model
    pub async fn ensure_model(&self, repo: &str, show_progress: bool) -> Result<PathBuf> {
        let repo = parse_repo_id(repo)?;
        let final_dir = self.model_path(&repo);

        if ModelManager::is_complete(&final_dir) {
            log::info!("Model already available: {}", final_dir.display());
            return Ok(final_dir);
        }

        log::info!("Downloading model {repo} into {}", final_dir.display());
        fs::create_dir_all(&self.models_dir).map_err(|e| {
            BlastError::file_io_error("create models directory", &self.models_dir, &e)
        })?;

        // Same filesystem as the destination so the final rename is atomic
        let temp_dir = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.models_dir)
            .map_err(|e| {
                BlastError::file_io_error("create temp directory", &self.models_dir, &e)
            })?;

        let progress = show_progress.then(create_progress_indicator);

        if let Err(e) = self
            .download_model_files(&repo, temp_dir.path(), progress.as_ref())
            .await
        {
            if let Some(pb) = &progress {
                pb.finish_with_message("❌ Download failed".to_string());
            }
            return Err(e);
        }

        if final_dir.exists() {
            fs::remove_dir_all(&final_dir).map_err(|e| {
                BlastError::file_io_error("remove incomplete model directory", &final_dir, &e)
            })?;
        }
        let staged = temp_dir.into_path();
        fs::rename(&staged, &final_dir).map_err(|e| {
            BlastError::file_io_error("move downloaded model into place", &final_dir, &e)
        })?;

        if let Some(pb) = progress {
            pb.finish_with_message(format!("✅ Downloaded {repo}"));
        }
        log::info!("Successfully downloaded model: {repo}");
        Ok(final_dir)
    }

    async fn download_model_files(
        &self,
        repo: &str,
        download_dir: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<()> {
        let raw_base = format!("{HUGGINGFACE_BASE}{repo}/resolve/main/");

        for file_name in CONFIG_FILES {
            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {file_name}"));
            }
            let result = self
                .download_file(&format!("{raw_base}{file_name}"), &download_dir.join(file_name), progress)
                .await;
            match result {
                Ok(_) => {},
                Err(e) if REQUIRED_FILES.contains(file_name) => return Err(e),
                Err(e) => log::warn!("Skipping optional {file_name}: {e}"),
            }
        }

        // At least one ONNX variant must succeed
        let mut downloaded_models = 0;
        for (variant, file_path) in ONNX_VARIANTS {
            if let Some(pb) = progress {
                pb.set_message(format!("Downloading {variant} model"));
            }
            let local_path = download_dir.join(file_path);

            match self
                .download_file(&format!("{raw_base}{file_path}"), &local_path, progress)
                .await
            {
                Ok(hash) => {
                    write_sidecar(&local_path, &hash)?;
                    downloaded_models += 1;
                    log::info!("Downloaded {variant} model variant");
                },
                Err(e) => {
                    log::warn!("Failed to download {variant} variant: {e}");
                    discard_partial(&local_path)?;
                },
            }
        }

        if downloaded_models == 0 {
            return Err(BlastError::network_error(
                format!("Failed to download any ONNX model variants for {repo}"),
                "no model files found",
            ));
        }
        Ok(())
    }

    /// Stream one file to disk, returning its SHA-256 hex digest
    ///
    /// The body lands in a `.part` file that is renamed over `local_path`
    /// only once the stream completes.
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<String> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| BlastError::file_io_error("create directory", parent, &e))?;
        }

        let partial = partial_path(local_path);
        match self.stream_to_file(url, &partial, progress).await {
            Ok(hash) => {
                fs::rename(&partial, local_path)
                    .map_err(|e| BlastError::file_io_error("finish download", local_path, &e))?;
                Ok(hash)
            },
            Err(e) => {
                discard_partial(local_path)?;
                Err(e)
            },
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&ProgressIndicator>,
    ) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BlastError::network_error(format!("Failed to download {url}"), e))?;

        if !response.status().is_success() {
            return Err(BlastError::network_error(
                format!("HTTP error for {url}"),
                response.status(),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BlastError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BlastError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BlastError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            if let Some(pb) = progress {
                pb.set_position(downloaded);
            }
        }

        file.flush()
            .await
            .map_err(|e| BlastError::file_io_error("flush file", local_path, &e))?;

        log::debug!("Downloaded {downloaded} bytes to {}", local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn create_progress_indicator() -> ProgressIndicator {
    #[cfg(feature = "cli")]
    {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        let pb = ProgressBar::new(0);
        pb.set_style(style);
        ProgressIndicator::Indicatif(pb)
    }
    #[cfg(not(feature = "cli"))]
    {
        ProgressIndicator::NoOp
    }
}

fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

fn partial_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Remove a failed download: the file, its `.part` and its sidecar
fn discard_partial(file: &Path) -> Result<()> {
    for path in [partial_path(file), file.to_path_buf(), sidecar_path(file)] {
        match fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed incomplete download {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(BlastError::file_io_error("remove incomplete download", &path, &e)),
        }
    }
    Ok(())
}

fn write_sidecar(file: &Path, hash: &str) -> Result<()> {
    let path = sidecar_path(file);
    fs::write(&path, format!("{hash}\n"))
        .map_err(|e| BlastError::file_io_error("write checksum", &path, &e))
}

/// SHA-256 hex digest of a file
///
/// # Errors
/// - File cannot be read
pub fn file_sha256(path: &Path) -> Result<String> {
    let contents =
        fs::read(path).map_err(|e| BlastError::file_io_error("read file for verification", path, &e))?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Check every ONNX file in a model folder against its `.sha256` sidecar
///
/// Returns `false` when a sidecar disagrees with its file. Files without a
/// sidecar (hand-placed models) are accepted.
///
/// # Errors
/// - Model or sidecar file cannot be read
pub fn verify_model_dir(model_dir: &Path) -> Result<bool> {
    for (variant, file) in ONNX_VARIANTS {
        let path = model_dir.join(file);
        let sidecar = sidecar_path(&path);
        if !path.is_file() || !sidecar.is_file() {
            continue;
        }

        let expected = fs::read_to_string(&sidecar)
            .map_err(|e| BlastError::file_io_error("read checksum", &sidecar, &e))?;
        let actual = file_sha256(&path)?;
        if actual != expected.trim() {
            log::warn!(
                "Integrity check failed for {variant} model {}: expected {}, got {actual}",
                path.display(),
                expected.trim()
            );
            return Ok(false);
        }
    }
    Ok(true)
}

/// Validate that a URL is a supported model repository
///
/// # Errors
/// - Empty URL, non-`HuggingFace` host or missing `owner/name`
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BlastError::invalid_config("Model URL cannot be empty"));
    }
    let Some(repo_path) = url.strip_prefix(HUGGINGFACE_BASE) else {
        return Err(BlastError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported (https://huggingface.co/...)"
        )));
    };
    parse_repo_id(repo_path).map(|_| ())
}

/// Normalize `owner/name` or a `HuggingFace` URL into `owner/name`
///
/// # Errors
/// - Anything other than exactly two non-empty path segments
pub fn parse_repo_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let path = trimmed
        .strip_prefix(HUGGINGFACE_BASE)
        .unwrap_or(trimmed)
        .trim_matches('/');

    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [owner, name]
            if !owner.is_empty()
                && !name.is_empty()
                && ![*owner, *name].iter().any(|p| *p == "." || *p == ".." || p.contains(':')) =>
        {
            Ok(format!("{owner}/{name}"))
        },
        _ => Err(BlastError::invalid_config(format!(
            "Invalid HuggingFace repository '{input}'. Expected owner/name"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url("https://huggingface.co/Xenova/modnet").is_ok());
        assert!(validate_model_url("").is_err());
        assert!(validate_model_url("https://github.com/user/repo").is_err());
        assert!(validate_model_url("https://huggingface.co/").is_err());
        assert!(validate_model_url("https://huggingface.co/single-part").is_err());
        assert!(validate_model_url("http://huggingface.co/user/repo").is_err());
    }

    #[test]
    fn test_parse_repo_id() {
        assert_eq!(parse_repo_id("Xenova/modnet").unwrap(), "Xenova/modnet");
        assert_eq!(
            parse_repo_id("https://huggingface.co/Xenova/modnet/").unwrap(),
            "Xenova/modnet"
        );
        assert!(parse_repo_id("modnet").is_err());
        assert!(parse_repo_id("a/b/c").is_err());
        assert!(parse_repo_id("../etc").is_err());
    }

    #[test]
    fn test_model_path_layout() {
        let downloader = ModelDownloader::new("/tmp/bgblast-models").unwrap();
        assert_eq!(
            downloader.model_path("Xenova/modnet"),
            PathBuf::from("/tmp/bgblast-models/Xenova--modnet")
        );
    }

    #[tokio::test]
    async fn test_ensure_model_skips_complete_folder() {
        let models = TempDir::new().unwrap();
        let model_dir = models.path().join("Xenova--modnet");
        fs::create_dir_all(model_dir.join("onnx")).unwrap();
        fs::write(model_dir.join("preprocessor_config.json"), "{}").unwrap();
        fs::write(model_dir.join("onnx/model.onnx"), b"weights").unwrap();

        let downloader = ModelDownloader::new(models.path()).unwrap();
        let path = downloader.ensure_model("Xenova/modnet", false).await.unwrap();
        assert_eq!(path, model_dir);
    }

    #[test]
    fn test_verify_model_dir() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("onnx/model.onnx");
        fs::create_dir_all(model.parent().unwrap()).unwrap();
        fs::write(&model, b"weights").unwrap();

        // No sidecar: accepted
        assert!(verify_model_dir(dir.path()).unwrap());

        write_sidecar(&model, &file_sha256(&model).unwrap()).unwrap();
        assert!(verify_model_dir(dir.path()).unwrap());

        fs::write(&model, b"truncated").unwrap();
        assert!(!verify_model_dir(dir.path()).unwrap());
    }

    fn stage_variant(dir: &Path, file: &str, contents: &[u8], with_sidecar: bool) -> PathBuf {
        let path = dir.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        if with_sidecar {
            write_sidecar(&path, &file_sha256(&path).unwrap()).unwrap();
        }
        path
    }

    #[test]
    fn test_failed_variant_is_not_kept() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("preprocessor_config.json"), "{}").unwrap();
        let truncated = stage_variant(dir.path(), "onnx/model.onnx", b"trunc", false);
        fs::write(partial_path(&truncated), b"trunc").unwrap();
        stage_variant(dir.path(), "onnx/model_fp16.onnx", b"half weights", true);

        discard_partial(&truncated).unwrap();

        assert!(!truncated.exists());
        assert!(!partial_path(&truncated).exists());
        assert!(!sidecar_path(&truncated).exists());
        assert!(verify_model_dir(dir.path()).unwrap());
        let manager = ModelManager::from_dir(dir.path(), None).unwrap();
        assert_eq!(manager.info().variant, "fp16");
    }

    #[test]
    fn test_discard_partial_without_files() {
        let dir = TempDir::new().unwrap();
        assert!(discard_partial(&dir.path().join("onnx/model.onnx")).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_download_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let target = stage_variant(dir.path(), "onnx/model.onnx", b"stale", false);

        let downloader = ModelDownloader::new(dir.path()).unwrap();
        let result = downloader
            .download_file("http://127.0.0.1:9/onnx/model.onnx", &target, None)
            .await;

        assert!(matches!(result, Err(BlastError::Network(_))));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn test_sha256_known_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
