//! Secret key handling
//!
//! The envelope key is exactly 32 bytes and is zeroed on drop so key
//! material does not linger in memory.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{TallyError, TallyResult};

/// A 32-byte symmetric key for the ledger envelope
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SecretKey::LEN]);

impl SecretKey {
    /// Required key length in bytes
    pub const LEN: usize = 32;

    /// Construct a key from raw material
    ///
    /// Any length other than 32 bytes fails with a configuration error
    /// before any I/O occurs.
    pub fn from_bytes(bytes: &[u8]) -> TallyResult<Self> {
        let material: [u8; Self::LEN] = bytes.try_into().map_err(|_| {
            TallyError::Config(format!(
                "expecting a secret key length of {} bytes, got {}",
                Self::LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(material))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

// Never expose key material through Debug output
impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey([redacted; {} bytes])", Self::LEN)
    }
}
