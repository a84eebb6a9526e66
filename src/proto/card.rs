//! OpenPGP card state as reported by the agent.

mod scan;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

pub(crate) use self::scan::StatusLine;
use super::{KdfCollection, ProtoError, ProtoResult};

/// Number of key slots on an OpenPGP card.
pub const MAX_KEYS: usize = 3;

/// Purpose of a card key slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyRole {
    /// Signature key, slot 1.
    Signature,
    /// Encryption key, slot 2.
    Encryption,
    /// Authentication key, slot 3.
    Authentication,
}

impl KeyRole {
    /// All roles in slot order.
    pub const ALL: [Self; MAX_KEYS] = [Self::Signature, Self::Encryption, Self::Authentication];

    /// Zero-based index into per-role arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// One-based slot number used on the wire.
    pub fn slot(self) -> usize {
        self.index() + 1
    }

    /// Role for a one-based slot number.
    pub fn from_slot(slot: usize) -> ProtoResult<Self> {
        match slot {
            1 => Ok(Self::Signature),
            2 => Ok(Self::Encryption),
            3 => Ok(Self::Authentication),
            slot => Err(ProtoError::SlotOutOfRange { slot }),
        }
    }
}

/// Sex of the card holder, coded as in ISO 5218.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Sex {
    /// Not known (`0`).
    #[default]
    Unspecified,
    /// Male (`1`).
    Male,
    /// Female (`2`).
    Female,
    /// Not applicable (`9`).
    NotApplicable,
}

impl Sex {
    /// ISO 5218 code.
    pub fn code(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Male => 1,
            Self::Female => 2,
            Self::NotApplicable => 9,
        }
    }

    /// Interpret a code sent by the card; unknown codes are [`Sex::Unspecified`].
    pub fn from_code(code: &str) -> Self {
        match code {
            "1" => Self::Male,
            "2" => Self::Female,
            "9" => Self::NotApplicable,
            _ => Self::Unspecified,
        }
    }
}

/// Card password selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pin {
    /// User PIN (PW1).
    User,
    /// Admin PIN (PW3).
    Admin,
}

impl Pin {
    /// Password number used by `PASSWD`.
    pub fn id(self) -> u8 {
        match self {
            Self::User => 1,
            Self::Admin => 3,
        }
    }

    /// Suffix appended to the serial number in `CHECKPIN`.
    pub fn check_suffix(self) -> &'static str {
        match self {
            Self::User => "",
            Self::Admin => "[CHV3]",
        }
    }
}

/// Public key material held by the agent for a keygrip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    /// Keygrip the key was looked up with.
    pub keygrip: String,

    /// Canonical S-expression of the public key.
    pub sexp: Vec<u8>,
}

/// Key stored in one of the card slots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardKey {
    /// Keygrip, the agent side identifier of the key.
    pub keygrip: Option<String>,

    /// OpenPGP fingerprint, hex encoded.
    pub fingerprint: Option<String>,

    /// Creation time recorded on the card.
    pub created: Option<DateTime<Utc>>,

    /// Resolved public key, filled in once the keygrip is known.
    pub public_key: Option<PublicKey>,
}

/// Card state collected from status lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Card {
    /// Name of the reader the card sits in.
    pub reader: String,

    /// Application identifier, hex encoded.
    pub serial: String,

    /// Application type, normally `OPENPGP`.
    pub app_type: String,

    /// Extended capabilities as sent, see [`Card::extended_capabilities`].
    pub ext_cap: String,

    /// PIN derivation parameters, present once a `KDF` line was seen.
    pub kdf: Option<KdfCollection>,

    /// Login data.
    pub login_data: String,

    /// Card holder name.
    pub display_name: String,

    /// Preferred languages.
    pub display_language: String,

    /// Card holder sex.
    pub display_sex: Sex,

    /// URL of the public key.
    pub public_key_url: String,

    /// Number of signatures made with the card.
    pub signature_counter: u32,

    /// Whether the PIN stays verified after a signature.
    pub signature_pin_cached: bool,

    /// Maximum PIN length, per role.
    pub max_pin_length: [u32; MAX_KEYS],

    /// Remaining PIN attempts, per role.
    pub pin_retry_counter: [u32; MAX_KEYS],

    /// Key slots, created as soon as a status line mentions them.
    pub subkeys: [Option<CardKey>; MAX_KEYS],
}

impl Card {
    /// Key in the given slot.
    pub fn subkey(&self, role: KeyRole) -> Option<&CardKey> {
        self.subkeys[role.index()].as_ref()
    }

    /// Signature key, if present.
    pub fn signature_key(&self) -> Option<&CardKey> {
        self.subkey(KeyRole::Signature)
    }

    /// Encryption key, if present.
    pub fn encryption_key(&self) -> Option<&CardKey> {
        self.subkey(KeyRole::Encryption)
    }

    /// Authentication key, if present.
    pub fn authentication_key(&self) -> Option<&CardKey> {
        self.subkey(KeyRole::Authentication)
    }

    /// Whether the card published a KDF data object.
    pub fn key_derived_format(&self) -> bool {
        self.kdf.is_some()
    }

    /// Extended capabilities as `key=value` pairs.
    ///
    /// Entries without `=` are skipped.
    pub fn extended_capabilities(&self) -> BTreeMap<&str, &str> {
        self.ext_cap
            .split('+')
            .filter_map(|entry| entry.split_once('='))
            .collect()
    }

    /// Manufacturer part of the serial number.
    pub fn manufacturer_id(&self) -> Option<&str> {
        if self.serial.len() != 32 {
            return None;
        }
        self.serial.get(16..20)
    }

    pub(crate) fn ensure_key(&mut self, slot: usize) -> ProtoResult<&mut CardKey> {
        let role = KeyRole::from_slot(slot)?;
        Ok(self.subkeys[role.index()].get_or_insert_with(CardKey::default))
    }
}
