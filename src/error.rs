//! Error types for background removal and record store operations

use thiserror::Error;

/// Result type alias for bgblast operations
pub type Result<T> = std::result::Result<T, BlastError>;

/// Error types for the matting pipeline, the inference provider and the record store
#[derive(Error, Debug)]
pub enum BlastError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source image could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Provider call failed or returned an unusable matte
    #[error("Inference error: {0}")]
    Inference(String),

    /// Compositing surface could not be allocated
    #[error("Render target error: {0}")]
    RenderTarget(String),

    /// Processed image could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Persistence read/write failed
    #[error("Store error: {0}")]
    Store(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input kind that the pipeline does not handle (video)
    #[error("Unsupported input: {0}")]
    Unsupported(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for BlastError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(error.to_string())
    }
}

impl BlastError {
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn render_target<S: Into<String>>(msg: S) -> Self {
        Self::RenderTarget(msg.into())
    }

    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error that keeps the underlying cause in the message
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Whether the error belongs to a single image rather than to the process
    ///
    /// Per-image errors leave the record pending; everything else points at
    /// the provider, the store or the environment.
    #[must_use]
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Inference(_) | Self::RenderTarget(_) | Self::Encode(_)
        )
    }
}
