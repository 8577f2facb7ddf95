/// Errors that can occur during packet framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The size prefix could not be decoded.
    #[error("malformed packet: {reason}")]
    MalformedPacket { reason: String },

    /// The payload exceeds the configured maximum size, or the size does not
    /// fit the codec's representation.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Stream-level error (I/O fault, closed stream, short read).
    #[error("stream error: {0}")]
    Stream(#[from] nodelink_stream::StreamError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        FrameError::MalformedPacket {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
