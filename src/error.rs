//! Errors returned by card operations.

use std::io;

use thiserror::Error;

use crate::proto::ProtoError;

/// Error returned by every [`Client`](crate::blocking::Client) operation.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A response line could not be interpreted.
    #[error("Agent: Protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// The transport failed.
    #[error("Agent: I/O error: {0}")]
    IO(#[from] io::Error),

    /// The agent terminated the command with an `ERR` line.
    #[error("Agent: command failed with code {code}: {message}")]
    Failed {
        /// Numeric error code as sent by the agent.
        code: u32,

        /// Human readable description sent along with the code.
        message: String,
    },

    /// Error raised by an external collaborator.
    #[error("Other error: {0:#}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl AgentError {
    /// Wrap any collaborator error.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}
