//! Intermediate response lines sent by the agent while a command runs.

use std::fmt;

use super::{escape, ProtoError, ProtoResult};

/// One non-terminal response line.
///
/// The terminal `OK` and `ERR` lines are consumed by the
/// [`Transport`](crate::transport::Transport) and never reach a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Status line (`S`), holding `KEYWORD args...` as sent, escapes
    /// included.
    Status(Vec<u8>),

    /// Data line (`D`), percent-decoded.
    Data(Vec<u8>),

    /// The agent asks for more input before it can continue.
    Inquire {
        /// What is being asked for.
        keyword: String,

        /// Remaining text of the line.
        parameters: String,
    },

    /// Comment line (`#`).
    Comment(String),
}

impl Response {
    /// Parse a single line, without its line terminator.
    pub fn parse(line: &[u8]) -> ProtoResult<Self> {
        let (kind, rest) = split_word(line);

        match kind {
            b"S" => Ok(Self::Status(rest.to_vec())),
            b"D" => Ok(Self::Data(escape::decode(rest))),
            b"INQUIRE" => {
                let (keyword, parameters) = split_word(rest);
                Ok(Self::Inquire {
                    keyword: String::from_utf8_lossy(keyword).into_owned(),
                    parameters: String::from_utf8_lossy(parameters).into_owned(),
                })
            }
            b"#" => Ok(Self::Comment(String::from_utf8_lossy(rest).into_owned())),
            _ => Err(ProtoError::UnexpectedResponse(
                String::from_utf8_lossy(line).into_owned(),
            )),
        }
    }

    /// Keyword of a status line.
    pub fn keyword(&self) -> Option<&[u8]> {
        match self {
            Self::Status(data) => data
                .split(u8::is_ascii_whitespace)
                .find(|word| !word.is_empty())
                .or(Some(&[][..])),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(data) => write!(f, "S {}", String::from_utf8_lossy(data)),
            Self::Data(data) => write!(f, "D {data:02x?}"),
            Self::Inquire {
                keyword,
                parameters,
            } => write!(f, "INQUIRE {keyword} {parameters}"),
            Self::Comment(comment) => write!(f, "# {comment}"),
        }
    }
}

fn split_word(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|&b| b == b' ') {
        Some(i) => (&line[..i], &line[i + 1..]),
        None => (line, &[][..]),
    }
}
