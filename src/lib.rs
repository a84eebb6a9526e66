#![doc = include_str!("../README.md")]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod proto;

pub mod blocking;
pub mod error;
pub mod transport;

// re-export dependencies that are used in the public API of our crate
pub use chrono;
pub use secrecy;
