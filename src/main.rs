use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::EnvFilter;

use tally::config::{Settings, DEFAULT_DB_PATH, KEY_ENV_VAR};
use tally::crypto::envelope;
use tally::models::DATE_FORMAT;
use tally::reconcile;
use tally::store::{LedgerStore, SliceFilter};

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Encrypted personal ledger manager",
    long_about = "Tally keeps a personal transaction ledger inside a single \
                  encrypted SQLite file. Transactions are identified by a \
                  content hash, imports are idempotent, and categories are \
                  managed by round-tripping a flat CSV edit table."
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Path to the encrypted ledger file
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    /// 32-byte secret key
    #[arg(long, global = true, env = KEY_ENV_VAR, hide_env_values = true)]
    key: Option<String>,

    /// Start date, MM/DD/YYYY (default: one year ago)
    #[arg(long, global = true)]
    start: Option<String>,

    /// End date, MM/DD/YYYY (default: today)
    #[arg(long, global = true)]
    end: Option<String>,

    /// Comma-separated category filter ("uncategorized" matches empty)
    #[arg(long, global = true)]
    category: Option<String>,

    /// Regex matched against the rendered transaction row
    #[arg(long, global = true)]
    regex: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the matching transactions and per-category totals
    List,

    /// Write the matching transactions as an editable CSV table
    ExportEdits {
        /// Output file
        file: PathBuf,
    },

    /// Diff an edited CSV table against the ledger and apply the changes
    ApplyEdits {
        /// Edited file produced by export-edits
        file: PathBuf,
    },

    /// Auto-categorize offsetting transaction pairs as payoffs
    MarkPayoffs,

    /// Encrypt stdin to stdout
    Encrypt,

    /// Decrypt stdin to stdout
    Decrypt,

    /// Write the decrypted SQLite database to a file
    WriteDecrypted {
        /// Output file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("tally=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let key = cli
        .key
        .as_deref()
        .with_context(|| format!("{KEY_ENV_VAR} is not set and --key was not given"))?;
    let settings = Settings::new(&cli.db, key.as_bytes())?;

    // The raw envelope commands never open the store.
    match cli.command {
        Commands::Encrypt => {
            let mut plaintext = Vec::new();
            io::stdin().read_to_end(&mut plaintext)?;
            io::stdout().write_all(&envelope::seal(&settings.key, &plaintext))?;
            return Ok(());
        }
        Commands::Decrypt => {
            let mut ciphertext = Vec::new();
            io::stdin().read_to_end(&mut ciphertext)?;
            io::stdout().write_all(&envelope::open(&settings.key, &ciphertext)?)?;
            return Ok(());
        }
        _ => {}
    }

    let store = LedgerStore::open(&settings.db_path, settings.key)
        .with_context(|| format!("failed to open {}", settings.db_path.display()))?;
    let filter = slice_filter(&cli)?;

    match cli.command {
        Commands::List => {
            let slice = store.slice(&filter)?;
            print_table(&slice)?;
        }
        Commands::ExportEdits { file } => {
            let slice = store.slice(&filter)?;
            let csv = reconcile::edit_csv(slice.transactions())?;
            fs::write(&file, csv)?;
            println!("wrote {} rows to {}", slice.len(), file.display());
        }
        Commands::ApplyEdits { file } => {
            let contents =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let changed = store.save_edit_csv(&contents)?;
            println!("applied {changed} edits");
        }
        Commands::MarkPayoffs => {
            let slice = store.slice(&filter)?;
            let marked = reconcile::mark_payoffs(slice.transactions());
            let csv = reconcile::edit_csv(&marked)?;
            let changed = store.save_edit_csv(&csv)?;
            println!("marked {changed} payoff transactions");
        }
        Commands::WriteDecrypted { file } => {
            store.write_decrypted(&file)?;
            println!("wrote decrypted database to {}", file.display());
        }
        Commands::Encrypt | Commands::Decrypt => unreachable!(),
    }

    store.flush()?;
    Ok(())
}

/// Build the slice filter from the global flags, defaulting to the last year
fn slice_filter(cli: &Cli) -> Result<SliceFilter> {
    let today = Local::now().date_naive();

    let start = match &cli.start {
        Some(s) => parse_date(s)?,
        None => today - Duration::days(365),
    };
    let end = match &cli.end {
        Some(s) => parse_date(s)?,
        None => today,
    };

    let categories = cli
        .category
        .as_deref()
        .map(|c| c.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    let regex = cli
        .regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --regex pattern")?;

    Ok(SliceFilter {
        start: Some(start),
        end: Some(end),
        regex,
        categories,
    })
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("invalid date {s:?}, expected MM/DD/YYYY"))
}

/// Render the slice as a padded table followed by category rollups
fn print_table(slice: &tally::models::TxSlice) -> Result<()> {
    let rows: Vec<[String; 6]> = slice
        .transactions()
        .iter()
        .map(|tx| tx.table_row())
        .collect();

    let mut widths = [0usize; 6];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for row in &rows {
        for (i, (cell, &width)) in row.iter().zip(widths.iter()).enumerate() {
            if i > 0 {
                write!(out, "  ")?;
            }
            write!(out, "{cell:<width$}")?;
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(
        out,
        "{} transactions over {:.0} days, net {}",
        slice.len(),
        slice.elapsed_days(),
        slice.total()
    )?;

    writeln!(out)?;
    for summary in slice.category_summaries() {
        let name = if summary.category.is_empty() {
            "(uncategorized)"
        } else {
            &summary.category
        };
        writeln!(
            out,
            "{:>12}  {:>4} txs  {:>5.1}%  {}",
            summary.total.to_string(),
            summary.transaction_count,
            summary.percentage_of_income,
            name
        )?;
    }

    Ok(())
}
