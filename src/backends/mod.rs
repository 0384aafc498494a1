//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (shortest-edge input, GPU acceleration)
//! - Tract backend (pure Rust, fixed square input)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

/// Provider name, availability and description for every compiled-in backend
#[must_use]
pub fn list_all_providers() -> Vec<(String, String, bool, String)> {
    #[allow(unused_mut)]
    let mut providers = Vec::new();

    #[cfg(feature = "onnx")]
    providers.extend(
        OnnxBackend::list_providers()
            .into_iter()
            .map(|(name, available, description)| ("onnx".to_string(), name, available, description)),
    );

    #[cfg(feature = "tract")]
    providers.extend(
        TractBackend::list_providers()
            .into_iter()
            .map(|(name, available, description)| ("tract".to_string(), name, available, description)),
    );

    providers
}
