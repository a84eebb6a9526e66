//! Blocking OpenPGP card client.
//!
//! Every operation holds the client lock for its whole duration, so the
//! lines of two operations never interleave on the transport.
//!
//! # Examples
//!
//! ```no_run
//! use assuan_card::{
//!     blocking::Client,
//!     error::AgentError,
//!     transport::{Handler, Transport},
//! };
//!
//! /// Connection to a running gpg-agent.
//! struct Agent;
//!
//! impl Transport for Agent {
//!     fn transact(&mut self, command: &str, handler: &mut dyn Handler) -> Result<(), AgentError> {
//!         unimplemented!("send {command} and feed the response lines to the handler")
//!     }
//! }
//!
//! # fn main() -> testresult::TestResult {
//! let client = Client::new(Agent);
//! let card = client.current_card()?;
//! eprintln!("Card {} in reader {}", card.serial, card.reader);
//! # Ok(()) }
//! ```

pub mod handler;

use std::{
    io,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::{debug, info};

use self::handler::{BlockedCounter, Discard, Generate, Inquire, Learn};
use crate::{
    error::AgentError,
    proto::{escape, Card, CardKey, KeyRole, Pin, ProtoError, Sex},
    transport::{Handler, KeyResolver, ReadKey, Transport},
};

/// Verification APDUs with a wrong PIN for PW1 and PW3.
const BLOCKING_APDUS: [&str; 2] = ["00200081084040404040404040", "00200083084040404040404040"];

/// Wrong verifications needed to block a PIN.
const BLOCKING_ATTEMPTS: u8 = 4;

/// TERMINATE DF followed by ACTIVATE FILE.
const WIPE_APDUS: [&str; 2] = ["00e60000", "00440000"];

const LEARN: &str = "LEARN --sendinfo --ssh-fpr";

#[derive(Debug)]
struct Session<T, R> {
    transport: T,
    resolver: R,
}

impl<T: Transport, R> Session<T, R> {
    fn transact(&mut self, command: &str, handler: &mut dyn Handler) -> Result<(), AgentError> {
        debug!("{command}");
        self.transport.transact(command, handler)
    }

    fn learn(&mut self, card: &mut Card) -> Result<(), AgentError> {
        self.transact(LEARN, &mut Learn::new(card))
    }
}

impl<T: Transport, R: KeyResolver> Session<T, R> {
    fn resolve(&mut self, key: &mut CardKey) -> Result<(), AgentError> {
        if let Some(keygrip) = &key.keygrip {
            key.public_key = Some(self.resolver.resolve(&mut self.transport, keygrip)?);
        }
        Ok(())
    }
}

/// Blocking OpenPGP card client.
#[derive(Debug)]
pub struct Client<T, R = ReadKey> {
    session: Mutex<Session<T, R>>,
}

impl<T: Transport> Client<T> {
    /// Client resolving keygrips with `READKEY`.
    pub fn new(transport: T) -> Self {
        Self::with_resolver(transport, ReadKey)
    }
}

impl<T: Transport, R: KeyResolver> Client<T, R> {
    /// Client resolving keygrips with `resolver`.
    pub fn with_resolver(transport: T, resolver: R) -> Self {
        Self {
            session: Mutex::new(Session {
                transport,
                resolver,
            }),
        }
    }

    /// Extracts the transport by consuming this object.
    pub fn into_inner(self) -> T {
        self.session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .transport
    }

    fn lock(&self) -> Result<MutexGuard<'_, Session<T, R>>, AgentError> {
        self.session
            .lock()
            .map_err(|_| io::Error::other("card client lock poisoned").into())
    }

    fn inquire(&self, command: &str) -> Result<(), AgentError> {
        self.lock()?.transact(command, &mut Inquire)
    }

    /// Read the state of the inserted card, resolving the keys on it.
    pub fn current_card(&self) -> Result<Card, AgentError> {
        let mut session = self.lock()?;

        let mut card = Card::default();
        session.learn(&mut card)?;
        for key in card.subkeys.iter_mut().flatten() {
            session.resolve(key)?;
        }

        Ok(card)
    }

    /// Set the card holder name.
    ///
    /// The card stores names as `surname<<given names`.
    pub fn set_display_name(&self, name: &str) -> Result<(), AgentError> {
        self.set_attribute("DISP-NAME", name)
    }

    /// Set the card holder sex.
    pub fn set_display_sex(&self, sex: Sex) -> Result<(), AgentError> {
        self.set_attribute("DISP-SEX", &sex.code().to_string())
    }

    /// Set the preferred languages, e.g. `deen`.
    pub fn set_display_language(&self, language: &str) -> Result<(), AgentError> {
        self.set_attribute("DISP-LANG", language)
    }

    /// Set the login data.
    pub fn set_login_data(&self, login_data: &str) -> Result<(), AgentError> {
        self.set_attribute("LOGIN-DATA", login_data)
    }

    fn set_attribute(&self, attribute: &str, value: &str) -> Result<(), AgentError> {
        self.inquire(&format!(
            "scd SETATTR {attribute} {}",
            escape::encode_with_plus(value)
        ))
    }

    /// Unblock `pin`; the agent prompts for the reset code or admin PIN.
    pub fn reset_password(&self, pin: Pin) -> Result<(), AgentError> {
        self.inquire(&format!("scd PASSWD --reset {}", pin.id()))
    }

    /// Change `pin`; the agent prompts for the old and new values.
    pub fn set_pin(&self, pin: Pin) -> Result<(), AgentError> {
        self.inquire(&format!("scd PASSWD {}", pin.id()))
    }

    /// Verify `pin` on `card`.
    ///
    /// Cards may cache a verified PIN until they are removed.
    pub fn check_pin(&self, card: &Card, pin: Pin) -> Result<(), AgentError> {
        self.inquire(&format!(
            "scd CHECKPIN {}{}",
            card.serial,
            pin.check_suffix()
        ))
    }

    /// Generate a new key in the `role` slot of `card`.
    ///
    /// The slot is cleared first. After generation the card state is
    /// learned again into `card` and the new key is resolved.
    pub fn add_key(&self, card: &mut Card, role: KeyRole) -> Result<(), AgentError> {
        let mut session = self.lock()?;

        card.subkeys[role.index()] = Some(CardKey::default());
        session.transact(
            &format!("scd GENKEY {}", role.slot()),
            &mut Generate::new(card, role),
        )?;

        debug!("generated key in slot {}, reloading card", role.slot());
        session.transact("RESET", &mut Discard)?;
        session.learn(card)?;

        let key = card.subkeys[role.index()].get_or_insert_with(CardKey::default);
        if key.keygrip.is_none() {
            return Err(ProtoError::MissingResponse("KEYPAIRINFO").into());
        }
        session.resolve(key)
    }

    /// Wipe the OpenPGP application of the card.
    ///
    /// Both PINs are blocked by entering wrong values until the retry
    /// counters reach zero, then the application is terminated and
    /// reactivated. The sequence stops at the first answer that does not
    /// match, leaving the PIN state of the card undetermined.
    pub fn factory_reset(&self) -> Result<(), AgentError> {
        let mut session = self.lock()?;

        session.transact("scd RESET", &mut Discard)?;
        session.transact("scd SERIALNO", &mut Discard)?;

        for apdu in BLOCKING_APDUS {
            for attempt in 0..BLOCKING_ATTEMPTS {
                let mut counter = BlockedCounter::new(attempt);
                session.transact(&format!("scd APDU {apdu}"), &mut counter)?;
                counter.finish()?;
            }
            info!("blocked PIN with APDU {apdu}");
        }

        for apdu in WIPE_APDUS {
            session.transact(&format!("scd APDU {apdu}"), &mut Discard)?;
        }
        info!("card application terminated and reactivated");

        Ok(())
    }
}
