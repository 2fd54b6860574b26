//! Error types for the diffusion bridge

use thiserror::Error;

/// Everything that can go wrong between the caller and the engine.
///
/// None of these cross the boundary: the JNI and C layers turn them into
/// `false` / null and log the message.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// `new_sd_ctx` returned null
    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    /// Generate called with no loaded model
    #[error("Model not loaded, call load_model() first")]
    NotLoaded,

    /// Engine returned an image without pixel data
    #[error("Engine produced no image data")]
    NoImageData,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Null byte in a string headed for C
    #[error("Null byte in string: {0}")]
    NullByte(#[from] std::ffi::NulError),

    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
