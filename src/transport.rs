//! Seams between the card commands and the connection to the agent.
//!
//! A [`Transport`] owns the connection: it writes a command line, reads
//! the response lines until the terminating `OK` or `ERR`, and hands every
//! line in between to a [`Handler`]. Handlers decide what each line means
//! for the running command and whether an inquiry must be answered.

use log::debug;

use crate::{
    blocking::handler::Collect,
    error::AgentError,
    proto::{ProtoError, PublicKey, Response},
};

/// Answer a [`Handler`] gives for a response line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Keep reading.
    Wait,

    /// Answer the pending inquiry with `END`.
    End,
}

/// Per-command interpretation of response lines.
pub trait Handler {
    /// Called once for every non-terminal response line, in order.
    ///
    /// Returning an error aborts the command.
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError>;
}

impl<F> Handler for F
where
    F: FnMut(Response) -> Result<Reply, AgentError>,
{
    fn handle(&mut self, response: Response) -> Result<Reply, AgentError> {
        self(response)
    }
}

/// Line based connection to the agent.
pub trait Transport {
    /// Send `command` and feed the response lines to `handler`.
    ///
    /// Implementations must write `END` whenever the handler returns
    /// [`Reply::End`], and return [`AgentError::Failed`] if the command
    /// ends with `ERR`.
    fn transact(&mut self, command: &str, handler: &mut dyn Handler) -> Result<(), AgentError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transact(&mut self, command: &str, handler: &mut dyn Handler) -> Result<(), AgentError> {
        (**self).transact(command, handler)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transact(&mut self, command: &str, handler: &mut dyn Handler) -> Result<(), AgentError> {
        (**self).transact(command, handler)
    }
}

/// Turns a keygrip into the public key it names.
pub trait KeyResolver {
    /// Look up `keygrip`, using `transport` if the agent has to be asked.
    fn resolve(
        &mut self,
        transport: &mut dyn Transport,
        keygrip: &str,
    ) -> Result<PublicKey, AgentError>;
}

/// Resolves keygrips with the agent's `READKEY` command.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReadKey;

impl KeyResolver for ReadKey {
    fn resolve(
        &mut self,
        transport: &mut dyn Transport,
        keygrip: &str,
    ) -> Result<PublicKey, AgentError> {
        let command = format!("READKEY {keygrip}");
        debug!("{command}");

        let mut collect = Collect::default();
        transport.transact(&command, &mut collect)?;

        let sexp = collect.into_data();
        if sexp.is_empty() {
            return Err(ProtoError::MissingResponse("READKEY").into());
        }

        Ok(PublicKey {
            keygrip: keygrip.to_string(),
            sexp,
        })
    }
}
