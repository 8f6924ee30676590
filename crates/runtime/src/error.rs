use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error(transparent)]
    Mcp(#[from] mcp::Error),
}

impl Error {
    /// Whether this error came from the model backend.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
