//! Import batch with id disambiguation
//!
//! Entities arriving from bank exports within one batch may hash
//! identically (two identical purchases on the same day). The batch
//! assigns an incrementing disambiguation suffix until every id is unique,
//! letting genuinely duplicate real-world entries coexist as distinct
//! rows. Bank-specific CSV parsing lives with the callers; the batch only
//! receives already-constructed entities.

use std::collections::HashSet;

use crate::models::{Investment, Transaction};

/// Accumulates entities for insertion, disambiguating id collisions
#[derive(Debug, Default)]
pub struct ImportBatch {
    tx_ids: HashSet<String>,
    transactions: Vec<Transaction>,
    investment_ids: HashSet<String>,
    investments: Vec<Investment>,
}

impl ImportBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction, assigning "0", "1", ... to its disambiguation
    /// field until the id is unique within this batch
    pub fn add(&mut self, mut tx: Transaction) {
        if self.tx_ids.contains(&tx.id()) {
            for i in 0.. {
                tx.disambiguation = i.to_string();
                if !self.tx_ids.contains(&tx.id()) {
                    break;
                }
            }
        }
        self.tx_ids.insert(tx.id());
        self.transactions.push(tx);
    }

    /// Add an investment lot, disambiguating like `add`
    pub fn add_investment(&mut self, mut investment: Investment) {
        if self.investment_ids.contains(&investment.id()) {
            for i in 0.. {
                investment.disambiguation = i.to_string();
                if !self.investment_ids.contains(&investment.id()) {
                    break;
                }
            }
        }
        self.investment_ids.insert(investment.id());
        self.investments.push(investment);
    }

    /// All batched transactions, in the order they were added
    pub fn all(&self) -> &[Transaction] {
        &self.transactions
    }

    /// All batched investment lots, in the order they were added
    pub fn all_investments(&self) -> &[Investment] {
        &self.investments
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.investments.is_empty()
    }
}
