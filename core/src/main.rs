//! FlatDB inspection tool
//!
//! Lists tables, dumps their live rows and shows who holds their locks.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Table as Grid, presets::UTF8_FULL};
use flatdb_core::{Config, Database, SystemClock, TxnId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "flatdb")]
#[command(about = "Inspect a FlatDB database directory")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "flatdb.toml")]
    config: PathBuf,

    /// Database directory, overriding the configuration
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database directory and its trigger tables
    Init {
        /// Drop and recreate existing trigger tables
        #[arg(long)]
        reset_triggers: bool,
    },
    /// List tables with their row counts
    Tables,
    /// Print the live rows of a table
    Dump { table: String },
    /// Show the current lock holders of a table
    Locks { table: String },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load_from_path(&cli.config)?;
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.data_dir));

    if let Command::Init { .. } = cli.command {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("cannot create {}", data_dir.display()))?;
    }
    let db = Database::open_with(&data_dir, &config, Arc::new(SystemClock))
        .with_context(|| format!("cannot open database {}", data_dir.display()))?;

    match cli.command {
        Command::Init { reset_triggers } => {
            if reset_triggers {
                db.prepare_for_triggers(true)?;
            }
            println!(
                "{} {}",
                "Database ready in".bright_green(),
                data_dir.display().to_string().bright_cyan()
            );
        }
        Command::Tables => print_tables(&db)?,
        Command::Dump { table } => dump(&db, &table)?,
        Command::Locks { table } => print_locks(&db, &table)?,
    }
    Ok(())
}

fn print_tables(db: &Database) -> Result<()> {
    let mut grid = Grid::new();
    grid.load_preset(UTF8_FULL);
    grid.set_header(vec!["Table", "Columns", "Row length", "Rows"]);
    for name in db.table_names() {
        let table = db.get(&name)?;
        let table = table.read();
        let columns: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !c.is_system)
            .map(|c| format!("{}:{}", c.name, c.length))
            .collect();
        grid.add_row(vec![
            name.clone(),
            columns.join(", "),
            table.row_length().to_string(),
            table.number_of_rows()?.to_string(),
        ]);
    }
    println!("{grid}");
    Ok(())
}

fn dump(db: &Database, name: &str) -> Result<()> {
    let table = db.get(name)?;
    let table = table.read();
    let columns: Vec<&str> = table
        .columns()
        .iter()
        .filter(|c| !c.is_system)
        .map(|c| c.name.as_str())
        .collect();

    let outcome = table.select_all()?;
    let mut grid = Grid::new();
    grid.load_preset(UTF8_FULL);
    let mut header = vec!["#"];
    header.extend(&columns);
    grid.set_header(header);
    for (row_number, row) in &outcome.value {
        let mut cells = vec![row_number.to_string()];
        cells.extend(columns.iter().map(|c| row.get(*c).cloned().unwrap_or_default()));
        grid.add_row(cells);
    }
    println!("{grid}");
    println!("{} live rows", outcome.value.len().to_string().bright_cyan());
    for warning in &outcome.warnings {
        eprintln!("{} {}", "warning:".bright_yellow(), warning);
    }
    Ok(())
}

fn holder(id: TxnId) -> String {
    let secs = (id.0 / 1_000_000_000) as i64;
    let nanos = (id.0 % 1_000_000_000) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(at) => {
            let since = at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
            format!("{id} (since {since})")
        }
        None => id.to_string(),
    }
}

fn print_locks(db: &Database, name: &str) -> Result<()> {
    db.get(name)?;
    let locks = db.locks().locks_of(name)?;
    if locks.is_free() {
        println!("{} {}", name.bright_cyan(), "is not locked".bright_green());
        return Ok(());
    }

    let mut grid = Grid::new();
    grid.load_preset(UTF8_FULL);
    grid.set_header(vec!["Mode", "Holder"]);
    if let Some(id) = locks.exclusive {
        grid.add_row(vec!["exclusive".to_string(), holder(id)]);
    }
    for id in locks.shared {
        grid.add_row(vec!["shared".to_string(), holder(id)]);
    }
    println!("{grid}");
    println!(
        "Locks older than {}s are reclaimed",
        db.locks().timeout().as_secs().to_string().bright_cyan()
    );
    Ok(())
}
