//! Reconciliation engine
//!
//! The bulk-edit workflow: export the snapshot as a flat delimited table,
//! let the user edit category/ignored columns, then diff the table back
//! against the snapshot and apply only the rows that actually changed.
//! Also hosts the payoff-matching heuristic that auto-categorizes
//! offsetting transaction pairs.

mod edit;
mod payoff;

pub use edit::{edit_csv, parse_edit_csv};
pub use payoff::{mark_payoffs, PAYOFF_CATEGORY, PAYOFF_WINDOW_DAYS};
