/// Errors that can occur while supervising a node process.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The child process could not be launched.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// Waiting on the child process failed.
    #[error("failed to wait for node process: {0}")]
    Wait(std::io::Error),

    /// Intercom setup failed.
    #[error("intercom error: {0}")]
    Intercom(#[from] nodelink_intercom::IntercomError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
