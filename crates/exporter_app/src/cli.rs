use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "confluence-export",
    version,
    about = "Export a Confluence space to Markdown files"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Confluence site, e.g. https://acme.atlassian.net
    #[arg(long, env = "CONFLUENCE_URL", global = true)]
    pub url: Option<String>,

    /// Account email used for basic authentication
    #[arg(long, env = "CONFLUENCE_EMAIL", global = true)]
    pub email: Option<String>,

    /// API token for the account
    #[arg(long, env = "CONFLUENCE_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Key of the space to export
    #[arg(long, env = "CONFLUENCE_SPACE", global = true)]
    pub space: Option<String>,

    /// Export root; pages go to <output>/<space key>/
    #[arg(long, short, env = "OUTPUT_DIR", global = true)]
    pub output: Option<PathBuf>,

    /// RON config file (default: ./confluence_export.ron when present)
    #[arg(long, env = "CONFLUENCE_EXPORT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Fail a page when one of its attachment references cannot be resolved
    #[arg(long, global = true)]
    pub fail_on_missing_attachments: bool,

    /// Download only attachments the page body refers to, and skip the attachment list
    #[arg(long, global = true)]
    pub referenced_attachments_only: bool,

    /// Omit the YAML front matter
    #[arg(long, global = true)]
    pub no_front_matter: bool,

    /// Never ask for missing settings
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Also write debug logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only errors and the final summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Command {
    /// Export every current page of the space (default)
    #[default]
    Export,
    /// Verify credentials and show what the account can see; writes nothing
    Check,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or_default()
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
