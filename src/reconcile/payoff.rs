//! Payoff matching heuristic
//!
//! Finds pairs of transactions with equal and opposite amounts that cancel
//! out (a refund, a reimbursed bill, a credit-card payment) and
//! re-categorizes both into the reserved "payoff" category. This is a
//! greedy, order-dependent heuristic over an immutable input: ties are
//! broken by encounter order, not by closest date or best memo match, and
//! nothing is mutated in place.

use std::collections::HashMap;

use crate::models::Transaction;

/// Reserved category assigned to both sides of a matched pair
pub const PAYOFF_CATEGORY: &str = "payoff";

/// A candidate's date must fall within this many days of the seed's date
/// (unless its memo matches exactly)
pub const PAYOFF_WINDOW_DAYS: i64 = 4;

/// Derive re-categorized clones for every offsetting pair found
///
/// For each negative-amount transaction not yet consumed, in input order,
/// the first transaction in the negated-amount bucket qualifies if its
/// category is still empty and it is either within the date window or an
/// exact memo match. Both sides are consumed so neither is matched twice.
/// The result contains only the clones; callers persist them through the
/// store's update path.
pub fn mark_payoffs(transactions: &[Transaction]) -> Vec<Transaction> {
    let mut by_amount: HashMap<i64, Vec<usize>> = HashMap::new();
    for (index, tx) in transactions.iter().enumerate() {
        by_amount.entry(tx.amount.cents()).or_default().push(index);
    }

    let mut consumed = vec![false; transactions.len()];
    let mut marked = Vec::new();

    for (index, tx) in transactions.iter().enumerate() {
        if consumed[index] || !tx.amount.is_negative() {
            continue;
        }

        let Some(bucket) = by_amount.get(&-tx.amount.cents()) else {
            continue;
        };

        let matched = bucket.iter().copied().find(|&candidate| {
            if consumed[candidate] {
                return false;
            }
            let other = &transactions[candidate];
            other.category.is_empty()
                && ((other.date - tx.date).num_days().abs() <= PAYOFF_WINDOW_DAYS
                    || other.memo == tx.memo)
        });

        if let Some(candidate) = matched {
            consumed[index] = true;
            consumed[candidate] = true;
            marked.push(recategorized(tx));
            marked.push(recategorized(&transactions[candidate]));
        }
    }

    marked
}

fn recategorized(tx: &Transaction) -> Transaction {
    let mut clone = tx.clone();
    clone.category = PAYOFF_CATEGORY.to_string();
    clone
}
