//! `confluence-export`: exports one Confluence space to Markdown files.

mod cli;
mod commands;
mod logging;
mod progress;
mod settings;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Command};
use commands::Outcome;

fn main() -> ExitCode {
    // A missing .env is fine; variables may come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::initialize(cli.log_level(), cli.log_file.as_deref());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: starting async runtime: {err}");
            return Outcome::Fatal.into();
        }
    };

    let result = match cli.command() {
        Command::Export => runtime.block_on(commands::export(&cli)),
        Command::Check => runtime.block_on(commands::check(&cli)),
    };
    match result {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            eprintln!("error: {err:#}");
            Outcome::Fatal.into()
        }
    }
}
