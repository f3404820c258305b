use std::path::PathBuf;

use propmap::{ConfigSource, ConfigTree};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, clap::Parser)]
pub struct Command {
    /// Path to a JSON or TOML document
    file: PathBuf,

    /// A dotted path to print on its own
    path: Option<String>,
}

impl Command {
    #[instrument(level = "debug", skip(self), fields(file = %self.file.display()))]
    pub fn run(self) -> anyhow::Result<()> {
        let config = ConfigTree::open(&ConfigSource::file(self.file))?;

        if let Some(path) = self.path {
            println!("{}", config.get(&path)?);
            return Ok(());
        }

        if config.is_empty() {
            println!("{}", "No variables defined".dim());
            return Ok(());
        }

        for (path, value) in config.entries() {
            println!("{} = {value}", path.info());
        }

        Ok(())
    }
}
