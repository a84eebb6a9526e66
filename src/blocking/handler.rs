//! Response handlers used by the card commands.
//!
//! Each handler is a small state machine fed with the response lines of a
//! single command. A line the current command does not expect aborts it.

use log::trace;

use crate::{
    error::AgentError,
    proto::{Card, CardKey, KeyRole, ProtoError, Response, StatusLine},
    transport::{Handler, Reply},
};

/// Status keywords that may show up during any command.
const BENIGN_STATUS: [&[u8]; 2] = [b"PROGRESS", b"PINENTRY_LAUNCHED"];

fn unexpected(response: &Response) -> AgentError {
    ProtoError::UnexpectedResponse(response.to_string()).into()
}

/// Commands that may ask for input but report nothing of interest.
///
/// Every inquiry is answered with `END`.
#[derive(Debug, Default)]
pub struct Inquire;

impl Handler for Inquire {
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        match &response {
            Response::Inquire { keyword, .. } => {
                trace!("answering inquiry {keyword}");
                Ok(Reply::End)
            }
            Response::Comment(_) => Ok(Reply::Wait),
            Response::Status(_)
                if response
                    .keyword()
                    .is_some_and(|keyword| BENIGN_STATUS.contains(&keyword)) =>
            {
                Ok(Reply::Wait)
            }
            _ => Err(unexpected(&response)),
        }
    }
}

/// Folds every status line into a [`Card`].
#[derive(Debug)]
pub struct Learn<'a> {
    card: &'a mut Card,
}

impl<'a> Learn<'a> {
    /// Scan into `card`.
    pub fn new(card: &'a mut Card) -> Self {
        Self { card }
    }
}

impl Handler for Learn<'_> {
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        match response {
            Response::Status(line) => self.card.scan(line)?,
            Response::Data(_) | Response::Comment(_) => {}
            other @ Response::Inquire { .. } => return Err(unexpected(&other)),
        }
        Ok(Reply::Wait)
    }
}

/// Key generation in one slot.
///
/// `KEY-CREATED-AT` and `KEY-FPR` describe the key being generated and are
/// applied to its slot directly; every other status line is scanned into
/// the card as usual.
#[derive(Debug)]
pub struct Generate<'a> {
    card: &'a mut Card,
    role: KeyRole,
}

impl<'a> Generate<'a> {
    /// Collect the results for the key in `role` of `card`.
    pub fn new(card: &'a mut Card, role: KeyRole) -> Self {
        Self { card, role }
    }

    fn key(&mut self) -> &mut CardKey {
        self.card.subkeys[self.role.index()].get_or_insert_with(CardKey::default)
    }

    fn status(&mut self, line: &[u8]) -> Result<(), AgentError> {
        let status = StatusLine::parse(line)?;
        match status.keyword() {
            "KEY-DATA" => {}
            "KEY-CREATED-AT" => {
                status.expect_fields(1)?;
                self.key().created = Some(status.timestamp(0)?);
            }
            "KEY-FPR" => {
                status.expect_fields(1)?;
                self.key().fingerprint = Some(status.text(0)?.to_string());
            }
            _ => self.card.scan(line)?,
        }
        Ok(())
    }
}

impl Handler for Generate<'_> {
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        match response {
            Response::Inquire { .. } => Ok(Reply::End),
            Response::Status(line) => {
                self.status(&line)?;
                Ok(Reply::Wait)
            }
            Response::Comment(_) => Ok(Reply::Wait),
            other => Err(unexpected(&other)),
        }
    }
}

/// One deliberately failing PIN verification during a factory reset.
///
/// The card must answer with a single status word whose second byte
/// carries the remaining tries, `0xC0 + attempt`.
#[derive(Debug)]
pub struct BlockedCounter {
    attempt: u8,
    seen: bool,
}

impl BlockedCounter {
    /// Expect the answer to the `attempt`-th verification.
    pub fn new(attempt: u8) -> Self {
        Self {
            attempt,
            seen: false,
        }
    }

    /// Check that the answer actually arrived.
    pub fn finish(self) -> Result<(), AgentError> {
        if self.seen {
            Ok(())
        } else {
            Err(ProtoError::MissingResponse("APDU").into())
        }
    }
}

impl Handler for BlockedCounter {
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        match response {
            Response::Data(answer) => {
                let expected = 0xc0u8.wrapping_add(self.attempt);
                if self.seen || answer.len() != 2 || answer[1] != expected {
                    return Err(ProtoError::UnexpectedApdu {
                        attempt: self.attempt,
                        answer,
                    }
                    .into());
                }
                self.seen = true;
                Ok(Reply::Wait)
            }
            other => Err(unexpected(&other)),
        }
    }
}

/// Commands whose output is not needed.
#[derive(Debug, Default)]
pub struct Discard;

impl Handler for Discard {
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        match response {
            Response::Inquire { .. } => Err(unexpected(&response)),
            _ => Ok(Reply::Wait),
        }
    }
}

/// Gathers the `D` payload of a command.
#[derive(Debug, Default)]
pub struct Collect {
    data: Vec<u8>,
}

impl Collect {
    /// Data received so far.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Handler for Collect {
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        match response {
            Response::Data(data) => self.data.extend(data),
            Response::Status(_) | Response::Comment(_) => {}
            other => return Err(unexpected(&other)),
        }
        Ok(Reply::Wait)
    }
}
