//! Runtime settings for Tally
//!
//! The secret key is sourced from the environment rather than stored in any
//! config file; the database path defaults to the working directory.

use std::path::PathBuf;

use crate::crypto::SecretKey;
use crate::error::{TallyError, TallyResult};

/// Environment variable holding the 32-byte secret key
pub const KEY_ENV_VAR: &str = "TALLY_SECRET_KEY";

/// Default path of the encrypted ledger file
pub const DEFAULT_DB_PATH: &str = "tally.sqlite3.encrypted";

/// Resolved runtime settings
#[derive(Debug)]
pub struct Settings {
    /// Path to the encrypted ledger file
    pub db_path: PathBuf,

    /// The 32-byte envelope key
    pub key: SecretKey,
}

impl Settings {
    /// Build settings from an explicit path and raw key material
    ///
    /// Fails with a configuration error before any I/O if the key material
    /// is not exactly 32 bytes.
    pub fn new(db_path: impl Into<PathBuf>, key_material: &[u8]) -> TallyResult<Self> {
        Ok(Self {
            db_path: db_path.into(),
            key: SecretKey::from_bytes(key_material)?,
        })
    }

    /// Build settings from the environment, with the default database path
    pub fn from_env() -> TallyResult<Self> {
        let material = std::env::var(KEY_ENV_VAR).map_err(|_| {
            TallyError::Config(format!("{} is not set", KEY_ENV_VAR))
        })?;
        Self::new(DEFAULT_DB_PATH, material.as_bytes())
    }
}
