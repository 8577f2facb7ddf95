/// Errors that can occur on the intercom channel.
#[derive(Debug, thiserror::Error)]
pub enum IntercomError {
    /// Failed to bind the listening socket.
    #[error("failed to bind intercom listener: {0}")]
    Bind(std::io::Error),

    /// The client could not reach the configured port.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        source: std::io::Error,
    },

    /// The intercom was closed before a connection was available.
    #[error("intercom closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, IntercomError>;
