//! Tally - encrypted personal ledger manager
//!
//! Tally keeps a personal transaction ledger inside a single encrypted
//! SQLite file. Entities are identified by a content hash over their
//! immutable fields, so repeated imports are idempotent and bulk edits can
//! round-trip through a flat CSV table.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Runtime settings and key sourcing
//! - `error`: Custom error types
//! - `crypto`: The AES-CFB file envelope and key handling
//! - `models`: Core data models (transactions, investments, money)
//! - `store`: The encrypted store, snapshot reads, and the derived cache
//! - `import`: Batch assembly with id disambiguation
//! - `reconcile`: Edit-table export/apply and payoff matching
//!
//! # Example
//!
//! ```rust,ignore
//! use tally::config::Settings;
//! use tally::store::LedgerStore;
//!
//! let settings = Settings::from_env()?;
//! let store = LedgerStore::open(&settings.db_path, settings.key)?;
//! let slice = store.default_slice()?;
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod import;
pub mod models;
pub mod reconcile;
pub mod store;

pub use error::{TallyError, TallyResult};
pub use store::LedgerStore;
