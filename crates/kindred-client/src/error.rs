use thiserror::Error;

/// Errors surfaced by the conversation client. None of them are fatal: the
/// conversation logs them and degrades to an inert view.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("session rejected by server")]
    Unauthorized,

    #[error("transport error: {0}")]
    Transport(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
