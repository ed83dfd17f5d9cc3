use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerIpcError {
    #[error("player binary not found")]
    BinaryNotFound,

    #[error("error spawning player: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ipc socket path is not set")]
    NoSocketPath,

    #[error("error connecting to ipc socket {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("ipc i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error encoding ipc request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("player returned error: {0}")]
    Server(String),

    #[error("unexpected type for property {property:?}")]
    PropertyType { property: &'static str },

    #[error("error stopping player: {0}")]
    Stop(String),
}
