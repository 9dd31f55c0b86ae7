//! Execution and server configuration.

use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a batch is executed on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// A pool of threads inside the server process.
    #[serde(rename = "threads")]
    Threads,
    /// One isolated child process per file.
    #[serde(rename = "forks")]
    Processes,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Threads => write!(f, "threads"),
            ExecutionMode::Processes => write!(f, "forks"),
        }
    }
}

/// Errors from validating a client's requested configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("payload must be an object with 'mode' and 'count'")]
    Shape,

    #[error("invalid mode '{0}', expected 'threads' or 'forks'")]
    Mode(String),

    #[error("count must be an integer greater than 0")]
    Count,
}

/// The pool kind and size a client wants its batches executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub count: NonZeroUsize,
}

impl ExecutionConfig {
    pub fn new(mode: ExecutionMode, count: NonZeroUsize) -> Self {
        ExecutionConfig { mode, count }
    }

    pub fn threads(count: NonZeroUsize) -> Self {
        ExecutionConfig::new(ExecutionMode::Threads, count)
    }

    pub fn processes(count: NonZeroUsize) -> Self {
        ExecutionConfig::new(ExecutionMode::Processes, count)
    }

    /// Validates a raw `SET_CONFIG` payload.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, ConfigError> {
        let object = payload.as_object().ok_or(ConfigError::Shape)?;
        let (Some(mode), Some(count)) = (object.get("mode"), object.get("count")) else {
            return Err(ConfigError::Shape);
        };

        let mode = match mode.as_str() {
            Some("threads") => ExecutionMode::Threads,
            Some("forks") => ExecutionMode::Processes,
            Some(other) => return Err(ConfigError::Mode(other.to_string())),
            None => return Err(ConfigError::Mode(mode.to_string())),
        };
        let count = count
            .as_u64()
            .and_then(|count| usize::try_from(count).ok())
            .and_then(NonZeroUsize::new)
            .ok_or(ConfigError::Count)?;

        Ok(ExecutionConfig { mode, count })
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig::threads(NonZeroUsize::MIN)
    }
}

impl fmt::Display for ExecutionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{}", self.mode, self.count)
    }
}

/// Configuration for the dispatch server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,

    /// Directory holding the files handed out on a trigger.
    pub text_dir: PathBuf,

    /// Only files with this extension are listed.
    pub file_extension: String,

    /// Configuration given to clients until they send `SET_CONFIG`.
    pub default_execution: ExecutionConfig,

    /// Free-form text sent in `WELCOME`.
    pub server_info: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 65432)),
            text_dir: PathBuf::from("text_files"),
            file_extension: String::from("txt"),
            default_execution: ExecutionConfig::default(),
            server_info: format!("dispatch {}", env!("CARGO_PKG_VERSION")),
        }
    }
}
