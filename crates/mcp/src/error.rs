//! MCP error types.

use std::time::Duration;

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn server: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("server pipe error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("timeout after {0:?} waiting for response")]
    Timeout(Duration),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("duplicate tool name in catalog: {0}")]
    DuplicateTool(String),

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },

    #[error("server connection is broken by an earlier protocol error")]
    Broken,

    #[error("server has been stopped")]
    Stopped,
}

impl Error {
    /// Whether this error came from launching the process rather than talking to it.
    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
