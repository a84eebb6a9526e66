//! Errors raised while interpreting agent responses.

use std::num::ParseIntError;

use thiserror::Error;

/// Error while interpreting a status or response line.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Field count or structure of a status line does not match its keyword.
    #[error("illegal format for {keyword} line")]
    IllegalFormat {
        /// Keyword of the offending line.
        keyword: String,
    },

    /// Status keyword that the card model does not know.
    #[error("unknown property {keyword} in {line}")]
    UnknownProperty {
        /// The unrecognized keyword.
        keyword: String,

        /// The complete line, lossily converted to text.
        line: String,
    },

    /// Integer field that does not parse.
    #[error("invalid number in {keyword} line: {source}")]
    InvalidNumber {
        /// Keyword of the offending line.
        keyword: String,

        /// Underlying parse failure.
        source: ParseIntError,
    },

    /// Unix timestamp that cannot be represented.
    #[error("invalid timestamp {seconds} in {keyword} line")]
    InvalidTimestamp {
        /// Keyword of the offending line.
        keyword: String,

        /// Seconds since the epoch as sent by the agent.
        seconds: i64,
    },

    /// Key slot outside of the signature/encryption/authentication model.
    #[error("card only supports a maximum of 3 subkeys ({slot} was given)")]
    SlotOutOfRange {
        /// The 1-based slot number that was referenced.
        slot: usize,
    },

    /// A response line the running command did not expect.
    #[error("unexpected: {0}")]
    UnexpectedResponse(String),

    /// Verification APDU answer that does not show the expected counter.
    #[error("unexpected answer to blocking attempt {attempt}: {answer:02x?}")]
    UnexpectedApdu {
        /// Zero-based attempt number.
        attempt: u8,

        /// Raw answer bytes.
        answer: Vec<u8>,
    },

    /// The agent finished a command without sending the required data.
    #[error("agent sent no data for {0}")]
    MissingResponse(&'static str),
}

impl ProtoError {
    pub(crate) fn illegal_format(keyword: impl Into<String>) -> Self {
        Self::IllegalFormat {
            keyword: keyword.into(),
        }
    }
}

/// Protocol result type.
pub type ProtoResult<T> = Result<T, ProtoError>;
