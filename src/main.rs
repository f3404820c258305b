//! `pmap`: inspect and edit multi-value property files and flattened
//! configuration documents.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
