use thiserror::Error;

/// Failures the slideshow controller degrades on (never fatal).
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure talking to the slideshow server.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The server answered, but not with a success status.
    #[error("unexpected status {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    /// A relative image URL could not be resolved against the server base.
    #[error("invalid url {0}")]
    Url(String),

    /// Underlying IO error (local directory mode).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
