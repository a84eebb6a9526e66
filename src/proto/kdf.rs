//! Key derived format of OpenPGP cards.
//!
//! Cards that implement the KDF data object (OpenPGP card specification
//! 3.4, section 4.3.2) never see PINs in clear. The client hashes the PIN
//! with the iterated and salted S2K function from RFC 4880 §3.7.1.3 and
//! sends the digest instead. The parameters for this hash are published
//! by the card as a TLV blob, see [`KdfCollection::from_tags`].

use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder};
use secrecy::{ExposeSecret, SecretString, SecretVec};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::{ProtoError, ProtoResult};

/// Tags of the KDF data object.
pub mod tag {
    /// KDF algorithm, one byte.
    pub const KDF_ALGORITHM: u8 = 0x81;
    /// Hash algorithm, one byte.
    pub const HASH_ALGORITHM: u8 = 0x82;
    /// Iteration count, four bytes big endian.
    pub const ITERATION_COUNT: u8 = 0x83;
    /// Salt for the user PIN (PW1).
    pub const SALT_PW1: u8 = 0x84;
    /// Salt for the resetting code of PW1.
    pub const SALT_PW1_RESET: u8 = 0x85;
    /// Salt for the admin PIN (PW3).
    pub const SALT_PW3: u8 = 0x86;
    /// Hash of the default user PIN, computed by the card.
    pub const INITIAL_PW1_HASH: u8 = 0x87;
    /// Hash of the default admin PIN, computed by the card.
    pub const INITIAL_PW3_HASH: u8 = 0x88;
}

/// KDF algorithm byte meaning that PINs are sent in clear.
pub const KDF_NONE: u8 = 0x00;

/// KDF algorithm byte for the iterated and salted S2K.
pub const KDF_ITERSALTED_S2K: u8 = 0x03;

/// Smallest count the one byte iteration encoding can express.
pub const MIN_ITERATION_COUNT: u32 = 1024;

/// Largest count the one byte iteration encoding can express.
pub const MAX_ITERATION_COUNT: u32 = 65_011_712;

/// Salt length of the iterated and salted S2K.
pub const S2K_SALT_LEN: usize = 8;

const BLOCK_SIZE: usize = 8192;

/// Hash algorithms usable for PIN derivation.
///
/// Identifiers are the ones from RFC 4880 §9.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum HashAlgorithm {
    Sha1 = 2,
    Sha256 = 8,
    Sha384 = 9,
    Sha512 = 10,
    Sha224 = 11,
}

impl HashAlgorithm {
    /// Look up a hash by its OpenPGP identifier.
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            2 => Self::Sha1,
            8 => Self::Sha256,
            9 => Self::Sha384,
            10 => Self::Sha512,
            11 => Self::Sha224,
            _ => return None,
        })
    }

    /// OpenPGP identifier of this hash.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Native digest size in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    fn iterated_salted(self, salt: &[u8], password: &[u8], count: usize) -> Vec<u8> {
        match self {
            Self::Sha1 => iterated_salted::<Sha1>(salt, password, count),
            Self::Sha224 => iterated_salted::<Sha224>(salt, password, count),
            Self::Sha256 => iterated_salted::<Sha256>(salt, password, count),
            Self::Sha384 => iterated_salted::<Sha384>(salt, password, count),
            Self::Sha512 => iterated_salted::<Sha512>(salt, password, count),
        }
    }
}

/// Hash `salt ‖ password` repeated until `count` bytes went into the hash.
///
/// The input is hashed at least once completely, even if `count` is
/// smaller than its length.
fn iterated_salted<D: Digest>(salt: &[u8], password: &[u8], count: usize) -> Vec<u8> {
    let combined = Zeroizing::new([salt, password].concat());
    if combined.is_empty() {
        return D::digest(b"").to_vec();
    }

    let block = Zeroizing::new(combined.repeat((BLOCK_SIZE / combined.len()).max(1)));
    let mut hasher = D::new();
    let mut remaining = count.max(combined.len());
    while remaining > 0 {
        let n = remaining.min(block.len());
        hasher.update(&block[..n]);
        remaining -= n;
    }

    hasher.finalize().to_vec()
}

/// Expand a one byte iteration count (RFC 4880 §3.7.1.3).
pub fn decode_count(c: u8) -> u32 {
    (16 + u32::from(c & 0x0f)) << (u32::from(c >> 4) + 6)
}

/// Compress an iteration count into its one byte form.
///
/// Returns the smallest code whose expansion is at least `count`, so
/// counts between two representable values are rounded up.
///
/// # Panics
///
/// Panics if `count` lies outside of
/// [`MIN_ITERATION_COUNT`]`..=`[`MAX_ITERATION_COUNT`].
pub fn encode_count(count: u32) -> u8 {
    assert!(
        (MIN_ITERATION_COUNT..=MAX_ITERATION_COUNT).contains(&count),
        "iteration count {count} outside the encodable range"
    );

    (0..=u8::MAX)
        .find(|&c| decode_count(c) >= count)
        .unwrap_or(u8::MAX)
}

/// PIN hashing function for one of the card passwords.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kdf {
    hash: HashAlgorithm,
    salt: Vec<u8>,
    encoded_count: u8,
}

impl Kdf {
    /// Build a KDF from raw tag values.
    ///
    /// Returns `None` unless `algorithm` and `hash_algorithm` are single
    /// bytes naming the iterated salted S2K and a known hash, and `salt`
    /// is exactly [`S2K_SALT_LEN`] bytes long.
    pub fn new(
        algorithm: &[u8],
        hash_algorithm: &[u8],
        salt: &[u8],
        iteration_count: u8,
    ) -> Option<Self> {
        let (&[algorithm], &[hash]) = (algorithm, hash_algorithm) else {
            return None;
        };
        if algorithm != KDF_ITERSALTED_S2K || salt.len() != S2K_SALT_LEN {
            return None;
        }

        Some(Self {
            hash: HashAlgorithm::from_id(hash)?,
            salt: salt.to_vec(),
            encoded_count: iteration_count,
        })
    }

    /// Hash used by this KDF.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// Salt used by this KDF.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Iteration count in its one byte encoding.
    pub fn encoded_count(&self) -> u8 {
        self.encoded_count
    }

    /// Number of bytes hashed per derivation.
    pub fn iterations(&self) -> u32 {
        decode_count(self.encoded_count)
    }

    /// Derive the value the card expects instead of `password`.
    ///
    /// The digest is [`HashAlgorithm::digest_len`] bytes long.
    pub fn hash_password(&self, password: &SecretString) -> SecretVec<u8> {
        SecretVec::new(self.hash.iterated_salted(
            &self.salt,
            password.expose_secret().as_bytes(),
            self.iterations() as usize,
        ))
    }

    /// Check `password` against a previously derived hash in constant time.
    pub fn verify(&self, password: &SecretString, expected: &[u8]) -> bool {
        self.hash_password(password)
            .expose_secret()
            .as_slice()
            .ct_eq(expected)
            .into()
    }
}

/// PIN hashing functions announced by a card.
///
/// All slots empty means the card does not derive PINs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KdfCollection {
    /// KDF for the user PIN.
    pub pw1: Option<Kdf>,

    /// KDF for the resetting code.
    pub pw1_reset: Option<Kdf>,

    /// KDF for the admin PIN.
    pub pw3: Option<Kdf>,

    /// Card computed hash of the default user PIN, if published.
    pub initial_pw1_hash: Option<Vec<u8>>,

    /// Card computed hash of the default admin PIN, if published.
    pub initial_pw3_hash: Option<Vec<u8>>,
}

impl KdfCollection {
    /// Build the PIN hashing functions from a decoded KDF data object.
    ///
    /// Without a four byte iteration count the card does not use
    /// derived PINs and an empty collection is returned. Slots whose
    /// salt is missing or malformed, or whose algorithm or hash is not usable, stay
    /// empty.
    ///
    /// The iteration count is stored by the card in expanded form, it is
    /// compressed again with [`encode_count`] before use.
    pub fn from_tags(tags: &BTreeMap<u8, Vec<u8>>) -> ProtoResult<Self> {
        let Some(iteration) = tags
            .get(&tag::ITERATION_COUNT)
            .filter(|value| value.len() == 4)
        else {
            return Ok(Self::default());
        };

        let count = BigEndian::read_u32(iteration);
        if !(MIN_ITERATION_COUNT..=MAX_ITERATION_COUNT).contains(&count) {
            return Err(ProtoError::illegal_format("KDF"));
        }
        let encoded_count = encode_count(count);

        let value = |t: u8| tags.get(&t).map(Vec::as_slice).unwrap_or_default();
        let kdf = |salt: u8| {
            Kdf::new(
                value(tag::KDF_ALGORITHM),
                value(tag::HASH_ALGORITHM),
                value(salt),
                encoded_count,
            )
        };

        Ok(Self {
            pw1: kdf(tag::SALT_PW1),
            pw1_reset: kdf(tag::SALT_PW1_RESET),
            pw3: kdf(tag::SALT_PW3),
            initial_pw1_hash: tags.get(&tag::INITIAL_PW1_HASH).cloned(),
            initial_pw3_hash: tags.get(&tag::INITIAL_PW3_HASH).cloned(),
        })
    }

    /// `true` if no password is derived.
    pub fn is_empty(&self) -> bool {
        self.pw1.is_none() && self.pw1_reset.is_none() && self.pw3.is_none()
    }
}
