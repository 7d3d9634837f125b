//! Investment lot model and query-time holdings
//!
//! Investments are append-only: they carry no mutable user fields, so the
//! whole record feeds the content hash. Holdings are derived groupings and
//! are never persisted.

use chrono::NaiveDate;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::transaction::{DATE_FORMAT, ID_LEN};
use crate::error::TallyResult;

/// A single investment lot (purchase, sale, dividend reinvestment, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    /// Brokerage account number
    pub account: i64,

    /// Trade date
    pub date: NaiveDate,

    /// Activity kind as reported by the brokerage ("BUY", "DIV", ...)
    pub kind: String,

    /// Ticker symbol
    pub symbol: String,

    /// Share count; fractional for reinvestments
    pub shares: f64,

    /// Per-share price at the time of the activity
    pub price: f64,

    /// Synthetic tie-breaker for identical same-batch lots
    #[serde(default)]
    pub disambiguation: String,
}

impl Investment {
    /// Content-hash identity over every origin field
    pub fn id(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.account.to_string());
        hasher.update(self.date.format(DATE_FORMAT).to_string());
        hasher.update(&self.kind);
        hasher.update(&self.symbol);
        hasher.update(format!("{:.2}", self.shares));
        hasher.update(format!("{:.2}", self.price));
        hasher.update(&self.disambiguation);
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(ID_LEN);
        digest
    }
}

/// Derived grouping of investment lots by (account, symbol)
///
/// Lifecycle is query-time only; holdings are recomputed from the snapshot
/// on every call and never stored.
#[derive(Debug, Clone)]
pub struct Holding {
    pub account: i64,
    pub symbol: String,
    pub investments: Vec<Investment>,
}

impl Holding {
    /// Stable sort key for holding lists
    pub fn key(&self) -> String {
        format!("{}-{}", self.account, self.symbol)
    }

    /// Total share count across all lots
    pub fn shares(&self) -> f64 {
        self.investments.iter().map(|inv| inv.shares).sum()
    }

    /// Total purchase cost across all lots
    pub fn purchase_price(&self) -> f64 {
        self.investments
            .iter()
            .map(|inv| inv.price * inv.shares)
            .sum()
    }

    /// Current value priced through an injected symbol lookup
    pub fn current_value<F>(&self, lookup: F) -> TallyResult<f64>
    where
        F: Fn(&str) -> TallyResult<f64>,
    {
        let price = lookup(&self.symbol)?;
        Ok(self.shares() * price)
    }
}

/// Group investment lots into holdings, ordered by (account, symbol)
pub fn holdings(investments: &[Investment]) -> Vec<Holding> {
    let mut grouped: BTreeMap<(i64, String), Vec<Investment>> = BTreeMap::new();
    for inv in investments {
        grouped
            .entry((inv.account, inv.symbol.clone()))
            .or_default()
            .push(inv.clone());
    }

    grouped
        .into_iter()
        .map(|((account, symbol), investments)| Holding {
            account,
            symbol,
            investments,
        })
        .collect()
}
