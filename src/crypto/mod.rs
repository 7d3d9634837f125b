//! Cryptographic primitives for the encrypted ledger
//!
//! AES-256-CFB envelope sealing with a fresh random IV per write, and a
//! zeroizing wrapper for the fixed-length secret key. The envelope carries
//! no authentication tag; see `envelope` for the documented consequences.

pub mod envelope;
pub mod key;

pub use envelope::{open, seal, IV_SIZE};
pub use key::SecretKey;
