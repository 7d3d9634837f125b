//! Transaction model and slice helpers
//!
//! A transaction's identity is a truncated content hash over its immutable
//! origin fields. The mutable user fields (category, ignored, source) are
//! editable through the store's update path and never change the id.

use chrono::NaiveDate;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::money::Money;

/// Hex characters of the content hash kept as the entity id
pub const ID_LEN: usize = 10;

/// Date rendering used in the id hash and all user-facing tables
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// A single ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Originating account or import source (mutable, not part of the id)
    pub source: String,

    /// Transaction date
    pub date: NaiveDate,

    /// Memo text from the originating institution
    pub memo: String,

    /// Amount (positive for inflow, negative for outflow)
    pub amount: Money,

    /// Synthetic tie-breaker assigned when two entities in one import
    /// batch hash identically; empty for almost every row
    #[serde(default)]
    pub disambiguation: String,

    /// User-assigned category (mutable)
    #[serde(default)]
    pub category: String,

    /// Whether the transaction is excluded from totals (mutable)
    #[serde(default)]
    pub ignored: bool,
}

impl Transaction {
    /// Create a new uncategorized transaction
    pub fn new(
        source: impl Into<String>,
        date: NaiveDate,
        memo: impl Into<String>,
        amount: Money,
    ) -> Self {
        Self {
            source: source.into(),
            date,
            memo: memo.into(),
            amount,
            disambiguation: String::new(),
            category: String::new(),
            ignored: false,
        }
    }

    /// Content-hash identity: first 10 hex characters of the MD5 of the
    /// immutable fields
    ///
    /// The concatenation order and field formatting are load-bearing: the
    /// id is the join key for updates and for the edit-table round trip.
    pub fn id(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.date.format(DATE_FORMAT).to_string());
        hasher.update(self.amount.decimal_string());
        hasher.update(&self.memo);
        hasher.update(&self.disambiguation);
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(ID_LEN);
        digest
    }

    /// Check if the transaction has no category yet
    pub fn is_uncategorized(&self) -> bool {
        self.category.is_empty()
    }

    /// The six display columns: checkmark, source, date, amount, category, memo
    ///
    /// This rendered row is also what slice regexes match against.
    pub fn table_row(&self) -> [String; 6] {
        let marker = if self.ignored { "✘" } else { "✓" };
        [
            marker.to_string(),
            self.source.clone(),
            self.date.format(DATE_FORMAT).to_string(),
            self.amount.accounting(),
            self.category.clone(),
            self.memo.clone(),
        ]
    }

    /// The edit-table row: `[id, memo, date, amount, ignored, category]`
    pub fn edit_row(&self) -> [String; 6] {
        [
            self.id(),
            self.memo.clone(),
            self.date.format(DATE_FORMAT).to_string(),
            self.amount.accounting(),
            self.ignored.to_string(),
            self.category.clone(),
        ]
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.id(),
            self.date.format(DATE_FORMAT),
            self.amount.decimal_string(),
            self.memo,
            self.source,
            self.category,
            self.ignored
        )
    }
}

/// Per-category rollup over a slice
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: String,
    pub total: Money,
    pub transaction_count: usize,
    pub percentage_of_income: f64,
}

/// An ordered view over transactions, assumed already in snapshot order
#[derive(Debug, Clone, Default)]
pub struct TxSlice {
    transactions: Vec<Transaction>,
}

impl TxSlice {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Days between the first and last transaction, never less than one
    pub fn elapsed_days(&self) -> f64 {
        if self.transactions.is_empty() {
            return 0.0;
        }
        let start = self.transactions[0].date;
        let end = self.transactions[self.transactions.len() - 1].date;
        let days = (end - start).num_days() as f64;
        if days < 1.0 {
            1.0
        } else {
            days
        }
    }

    /// Net amount over the slice, skipping ignored transactions
    pub fn total(&self) -> Money {
        self.transactions
            .iter()
            .filter(|tx| !tx.ignored)
            .map(|tx| tx.amount)
            .sum()
    }

    /// Distinct categories present in the slice (ignored rows excluded)
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self
            .transactions
            .iter()
            .filter(|tx| !tx.ignored)
            .map(|tx| tx.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Per-category totals sorted by absolute amount, largest first
    ///
    /// Percentage of income is computed against the "income" category total
    /// when that total is positive.
    pub fn category_summaries(&self) -> Vec<CategorySummary> {
        let income: Money = self
            .transactions
            .iter()
            .filter(|tx| tx.category == "income")
            .map(|tx| tx.amount)
            .sum();

        let mut total_by_category: HashMap<String, (Money, usize)> = HashMap::new();
        for tx in self.transactions.iter().filter(|tx| !tx.ignored) {
            let entry = total_by_category
                .entry(tx.category.clone())
                .or_insert((Money::zero(), 0));
            entry.0 += tx.amount;
            entry.1 += 1;
        }

        let mut summaries: Vec<CategorySummary> = total_by_category
            .into_iter()
            .map(|(category, (total, transaction_count))| {
                let percentage_of_income = if income.is_positive() {
                    total.abs().cents() as f64 / income.cents() as f64 * 100.0
                } else {
                    0.0
                };
                CategorySummary {
                    category,
                    total,
                    transaction_count,
                    percentage_of_income,
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            b.total
                .abs()
                .cmp(&a.total.abs())
                .then_with(|| a.category.cmp(&b.category))
        });
        summaries
    }
}
