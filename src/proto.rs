//! Assuan status protocol structures for OpenPGP cards

pub mod card;
pub mod error;
pub mod escape;
pub mod kdf;
pub mod response;
pub mod tlv;

pub use self::card::*;
pub use self::error::{ProtoError as Error, ProtoResult as Result, *};
pub use self::kdf::{Kdf, KdfCollection};
pub use self::response::*;
