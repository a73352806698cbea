//! Subcommands and their output

use std::io::Write;

use anyhow::{Context, Result};
use clap::Subcommand;
use kvcache::{CacheStore, Entry, TableName};
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a table if it does not exist
    Init {
        table: String,
    },
    /// Insert or overwrite a key
    Put {
        table: String,
        key: String,
        value: String,
    },
    /// Print the value of a key (exit code 1 if absent)
    Get {
        table: String,
        key: String,
    },
    /// Delete a key
    Delete {
        table: String,
        key: String,
    },
    /// Print every entry of a table
    List {
        table: String,

        /// Print a JSON array instead of `key: value` lines
        #[arg(long)]
        json: bool,
    },
}

/// Whether the requested key existed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    NotFound,
}

#[derive(Serialize)]
struct Row<'a> {
    key: &'a str,
    value: &'a str,
}

pub fn run(store: &CacheStore, command: Command, out: &mut impl Write) -> Result<Outcome> {
    match command {
        Command::Init { table } => {
            store
                .initialize(&table)
                .with_context(|| format!("Failed to initialize table '{}'", table))?;
            writeln!(out, "OK")?;
        }
        Command::Put { table, key, value } => {
            attach(store, &table)?;
            store
                .put(&table, &key, &value)
                .with_context(|| format!("Failed to put {:?}", key))?;
            writeln!(out, "OK")?;
        }
        Command::Get { table, key } => {
            attach(store, &table)?;
            match store.get(&table, &key)? {
                Some(value) => writeln!(out, "{}", value)?,
                None => return Ok(Outcome::NotFound),
            }
        }
        Command::Delete { table, key } => {
            attach(store, &table)?;
            store
                .delete(&table, &key)
                .with_context(|| format!("Failed to delete {:?}", key))?;
            writeln!(out, "OK")?;
        }
        Command::List { table, json } => {
            attach(store, &table)?;
            let entries = store.list(&table)?;
            if json {
                write_json(out, &entries)?;
            } else {
                for entry in &entries {
                    writeln!(out, "{}: {}", entry.key, entry.value)?;
                }
            }
        }
    }
    Ok(Outcome::Done)
}

/// Attach to a table created by an earlier `init`. Every invocation is a
/// fresh process, so an existing database file counts as initialized.
fn attach(store: &CacheStore, table: &str) -> Result<()> {
    let name = TableName::parse(table)?;
    let path = store.config().data_dir.join(name.file_name());
    if path.exists() || store.config().auto_initialize {
        store.initialize(table)?;
    }
    Ok(())
}

fn write_json(out: &mut impl Write, entries: &[Entry]) -> Result<()> {
    let rows: Vec<Row<'_>> = entries
        .iter()
        .map(|e| Row {
            key: &e.key,
            value: &e.value,
        })
        .collect();
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    writeln!(out)?;
    Ok(())
}
