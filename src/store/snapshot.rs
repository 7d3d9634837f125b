//! In-memory snapshot of the materialized store
//!
//! The snapshot is the only thing read operations touch. It is reloaded
//! from the live database wholesale after every successful write and is
//! never partially updated.

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;

use super::schema::DB_DATE_FORMAT;
use crate::error::{TallyError, TallyResult};
use crate::models::{Investment, Money, Transaction};

/// Category sentinel matching transactions with an empty category
pub const UNCATEGORIZED: &str = "uncategorized";

/// Ordered view of every entity in the store
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    /// Sorted by (date, amount, memo, disambiguation)
    pub transactions: Vec<Transaction>,
    /// Sorted by (account, date, symbol, disambiguation)
    pub investments: Vec<Investment>,
}

impl Snapshot {
    pub(crate) fn load(conn: &Connection) -> TallyResult<Self> {
        Ok(Self {
            transactions: load_transactions(conn)?,
            investments: load_investments(conn)?,
        })
    }
}

fn parse_db_date(text: &str) -> TallyResult<NaiveDate> {
    NaiveDate::parse_from_str(text, DB_DATE_FORMAT)
        .map_err(|e| TallyError::Storage(format!("bad date {text} in store: {e}")))
}

fn load_transactions(conn: &Connection) -> TallyResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT source, date, memo, amount, disambiguation, category, ignored
         FROM tx ORDER BY date, amount, memo, disambiguation",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, bool>(6)?,
        ))
    })?;

    let mut transactions = Vec::new();
    for row in rows {
        let (source, date, memo, amount, disambiguation, category, ignored) = row?;
        transactions.push(Transaction {
            source,
            date: parse_db_date(&date)?,
            memo,
            amount: Money::from_cents(amount),
            disambiguation,
            category,
            ignored,
        });
    }
    Ok(transactions)
}

fn load_investments(conn: &Connection) -> TallyResult<Vec<Investment>> {
    let mut stmt = conn.prepare(
        "SELECT account, date, kind, symbol, shares, price, disambiguation
         FROM investment ORDER BY account, date, symbol, disambiguation",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, f64>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut investments = Vec::new();
    for row in rows {
        let (account, date, kind, symbol, shares, price, disambiguation) = row?;
        investments.push(Investment {
            account,
            date: parse_db_date(&date)?,
            kind,
            symbol,
            shares,
            price,
            disambiguation,
        });
    }
    Ok(investments)
}

/// Filter for `LedgerStore::slice`
///
/// All criteria are optional; an empty filter selects the whole snapshot.
#[derive(Debug, Default)]
pub struct SliceFilter {
    /// Inclusive start of the date range
    pub start: Option<NaiveDate>,
    /// Inclusive end of the date range
    pub end: Option<NaiveDate>,
    /// Matched against the rendered row of all visible fields
    pub regex: Option<Regex>,
    /// OR-matched; the "uncategorized" sentinel matches empty categories
    pub categories: Vec<String>,
}

impl SliceFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        if !self.categories.is_empty() {
            let found = self.categories.iter().any(|category| {
                tx.category == *category
                    || (category == UNCATEGORIZED && tx.category.is_empty())
            });
            if !found {
                return false;
            }
        }

        if let Some(regex) = &self.regex {
            if !regex.is_match(&tx.table_row().join(" ")) {
                return false;
            }
        }

        if let Some(start) = self.start {
            if tx.date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if tx.date > end {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(date: &str, memo: &str, cents: i64, category: &str) -> Transaction {
        let mut tx = Transaction::new(
            "dcu",
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            memo,
            Money::from_cents(cents),
        );
        tx.category = category.to_string();
        tx
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = SliceFilter::default();
        assert!(filter.matches(&tx("2018-01-01", "memo", -110, "")));
    }

    #[test]
    fn test_category_or_matching() {
        let filter = SliceFilter {
            categories: vec!["rent".to_string(), "food".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&tx("2018-01-01", "a", -1, "rent")));
        assert!(filter.matches(&tx("2018-01-01", "b", -1, "food")));
        assert!(!filter.matches(&tx("2018-01-01", "c", -1, "fuel")));
    }

    #[test]
    fn test_uncategorized_sentinel() {
        let filter = SliceFilter {
            categories: vec![UNCATEGORIZED.to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&tx("2018-01-01", "a", -1, "")));
        assert!(!filter.matches(&tx("2018-01-01", "b", -1, "rent")));
    }

    #[test]
    fn test_regex_matches_rendered_row() {
        let filter = SliceFilter {
            regex: Some(Regex::new("COFFEE SHOP").unwrap()),
            ..Default::default()
        };
        assert!(filter.matches(&tx("2018-01-01", "COFFEE SHOP #41", -450, "")));
        assert!(!filter.matches(&tx("2018-01-01", "GAS STATION", -3000, "")));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let filter = SliceFilter {
            start: Some(NaiveDate::from_ymd_opt(2018, 1, 2).unwrap()),
            end: Some(NaiveDate::from_ymd_opt(2018, 1, 4).unwrap()),
            ..Default::default()
        };
        assert!(!filter.matches(&tx("2018-01-01", "a", -1, "")));
        assert!(filter.matches(&tx("2018-01-02", "b", -1, "")));
        assert!(filter.matches(&tx("2018-01-04", "c", -1, "")));
        assert!(!filter.matches(&tx("2018-01-05", "d", -1, "")));
    }
}
