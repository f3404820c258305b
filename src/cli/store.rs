use std::{collections::BTreeMap, path::PathBuf};

use propmap::{FileChannel, MultiValueStore};
use tracing::instrument;

use super::terminal::Colorize;

type Store = MultiValueStore<String, String, FileChannel>;

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// Path to the property file
    file: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Print every key with its values
    List {
        /// Output format
        #[arg(long, value_name = "FORMAT", default_value = "pretty")]
        output: OutputFormat,
    },

    /// Print the values of one key, or a single value by position
    Get {
        /// The key to read
        key: String,

        /// Zero-based position within the key's list
        index: Option<usize>,
    },

    /// Append a value to a key
    Add {
        /// The key to append to
        key: String,

        /// The value to append
        value: String,

        /// Skip the append if the value is already present
        #[arg(long)]
        unique: bool,
    },

    /// Replace the value at a position
    Set {
        /// The key to modify
        key: String,

        /// Zero-based position within the key's list
        index: usize,

        /// The replacement value
        value: String,
    },

    /// Remove a key, or a single value from it
    Remove {
        /// The key to modify
        key: String,

        /// Remove only the first occurrence of this value
        value: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

impl Command {
    #[instrument(level = "debug", skip(self), fields(file = %self.file.display()))]
    pub fn run(self) -> anyhow::Result<()> {
        let store = Store::open(FileChannel::new(&self.file))?;

        match self.action {
            Action::List { output } => list(&store, output)?,
            Action::Get { key, index: None } => {
                for value in store.get(&key) {
                    println!("{value}");
                }
            }
            Action::Get {
                key,
                index: Some(index),
            } => println!("{}", store.get_at(&key, index)?),
            Action::Add { key, value, unique } => {
                let added = if unique {
                    store.add_if_absent(key.clone(), value.clone())?
                } else {
                    store.add(key.clone(), value.clone())?
                };
                if added {
                    println!("{}", format!("Added '{value}' to {key}").success());
                } else {
                    println!("{}", format!("'{value}' is already under {key}").dim());
                }
            }
            Action::Set { key, index, value } => {
                let previous = store.set(&key, index, value.clone())?;
                println!(
                    "{}",
                    format!("Replaced '{previous}' with '{value}' at {key}[{index}]").success()
                );
            }
            Action::Remove { key, value: None } => {
                let removed = store.remove(&key)?;
                if removed.is_empty() {
                    anyhow::bail!("Key '{key}' not found");
                }
                println!(
                    "{}",
                    format!("Removed {key} ({} value(s))", removed.len()).success()
                );
            }
            Action::Remove {
                key,
                value: Some(value),
            } => {
                if !store.remove_value(&key, &value)? {
                    anyhow::bail!("'{value}' not found under {key}");
                }
                println!("{}", format!("Removed '{value}' from {key}").success());
            }
        }

        Ok(())
    }
}

fn list(store: &Store, output: OutputFormat) -> anyhow::Result<()> {
    let entries: BTreeMap<String, Vec<String>> = store.snapshot().into_iter().collect();

    match output {
        OutputFormat::Pretty => {
            for (key, values) in &entries {
                println!("{} {}", key.info(), format!("({})", values.len()).dim());
                for value in values {
                    println!("  {value}");
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }

    Ok(())
}
