/// Result alias that carries the custom [`BeatscopeError`] type.
pub type Result<T> = std::result::Result<T, BeatscopeError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum BeatscopeError {
    /// Free-form message, mostly used for poisoned locks and host-side
    /// failures that have no dedicated variant.
    #[error("{0}")]
    Message(String),
    /// No input device matched the requested configuration.
    #[error("no audio input device available")]
    DeviceNotFound,
    /// The audio backend refused to open or start a stream.
    #[error("audio device error: {0}")]
    Device(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Audio file decoding failed on the host side.
    #[error("decode error: {0}")]
    Decode(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl BeatscopeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Device errors are non-fatal: the engine degrades to silence.
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::DeviceNotFound | Self::Device(_))
    }
}

impl From<&str> for BeatscopeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for BeatscopeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
