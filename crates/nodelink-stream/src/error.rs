/// Errors that can occur on a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// An I/O error occurred on the underlying resource.
    #[error("stream I/O fault: {0}")]
    Fault(#[from] std::io::Error),

    /// The stream was closed before this operation.
    #[error("stream is closed")]
    Closed,

    /// EOF arrived before the requested byte count was assembled.
    #[error("short read ({got} of {wanted} bytes before EOF)")]
    ShortRead { wanted: usize, got: usize },

    /// The stream has no read end.
    #[error("stream is not readable")]
    NotReadable,

    /// The stream has no write end.
    #[error("stream is not writable")]
    NotWritable,
}

pub type Result<T> = std::result::Result<T, StreamError>;
