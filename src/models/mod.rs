//! Core data models for Tally
//!
//! Ledger entities (transactions and investments) carry immutable origin
//! fields that define their content-hash identity, plus mutable user fields
//! (category, ignored) that never feed the hash.

pub mod investment;
pub mod money;
pub mod transaction;

pub use investment::{Holding, Investment};
pub use money::Money;
pub use transaction::{CategorySummary, Transaction, TxSlice, DATE_FORMAT};
