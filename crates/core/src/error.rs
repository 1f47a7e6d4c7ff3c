/// Result alias that carries the custom [`FlameVizError`] type.
pub type Result<T> = std::result::Result<T, FlameVizError>;

/// Common error type for the core crate.
///
/// Only setup paths (configuration, scene loading, device acquisition)
/// produce these. Per-frame work never fails.
#[derive(Debug, thiserror::Error)]
pub enum FlameVizError {
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON in a configuration or scene file.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// A configuration value outside of its accepted domain.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No audio input could be acquired.
    #[error("audio input unavailable: {0}")]
    DeviceUnavailable(String),
    /// The spectrum analyser was handed buffers of the wrong length.
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
}

impl FlameVizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
