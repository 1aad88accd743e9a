use std::process::ExitCode;

use anyhow::{Context, Result};
use export_logging::export_debug;
use exporter_engine::{
    check_connection, ExportEngine, ExportError, ReqwestConfluenceClient, StorageConverter,
};

use crate::cli::Cli;
use crate::progress::ConsoleProgress;
use crate::settings::{
    fetch_settings, optional_space, resolve_export, resolve_site, terminal_prompter, FileConfig,
    Prompter,
};

/// Process exit status of a finished command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Every page was exported.
    Success = 0,
    /// The run finished but some pages failed or the listing stopped early.
    PageFailures = 1,
    /// Configuration, authentication or output failure, or nothing listed.
    Fatal = 2,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome as u8)
    }
}

const CHECK_SPACE_LIMIT: u32 = 25;

pub(crate) async fn export(cli: &Cli) -> Result<Outcome> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let prompter = terminal_prompter(cli);
    let config = resolve_export(cli, &file, prompter.as_ref().map(|p| p as &dyn Prompter))?;
    export_debug!(
        "exporting space {} from {} into {}",
        config.space_key,
        config.site.wiki_root(),
        config.output_root.display()
    );

    let api = ReqwestConfluenceClient::new(config.site.clone(), config.fetch.clone())
        .context("creating HTTP client")?;
    let progress = ConsoleProgress::new(cli.quiet);
    let result = ExportEngine::new(&api, &StorageConverter, &config)
        .with_sink(&progress)
        .run()
        .await;

    match result {
        Ok(summary) => {
            if !cli.quiet || !summary.is_success() {
                eprint!("{}", summary.render());
            }
            if summary.is_success() {
                Ok(Outcome::Success)
            } else {
                Ok(Outcome::PageFailures)
            }
        }
        Err(ExportError::Aborted { reason, summary }) => {
            eprint!("{}", summary.render());
            eprintln!("error: run aborted: {reason}");
            Ok(Outcome::Fatal)
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn check(cli: &Cli) -> Result<Outcome> {
    let file = FileConfig::load(cli.config.as_deref())?;
    let prompter = terminal_prompter(cli);
    let site = resolve_site(cli, &file, prompter.as_ref().map(|p| p as &dyn Prompter))?;
    let space = optional_space(cli, &file);
    let root = site.wiki_root().clone();

    let api = ReqwestConfluenceClient::new(site, fetch_settings(&file))
        .context("creating HTTP client")?;
    let report = check_connection(&api, space.as_deref(), CHECK_SPACE_LIMIT)
        .await
        .with_context(|| format!("checking connection to {root}"))?;

    let user = &report.user;
    match &user.account_id {
        Some(id) => println!("Authenticated as {} ({id})", user.display_name),
        None => println!("Authenticated as {}", user.display_name),
    }
    println!("Spaces visible: {}", report.spaces.len());
    for visible in &report.spaces {
        println!("  {:<12} {}", visible.key, visible.name);
    }

    let Some(key) = space else {
        return Ok(Outcome::Success);
    };
    if let Some(err) = &report.space_error {
        println!("Space {key}: not accessible ({err})");
        return Ok(Outcome::PageFailures);
    }
    if let Some(found) = &report.space {
        println!("Space {}: {}", found.key, found.name);
    }
    match &report.sample_page {
        Some(page) => println!("Sample page: {} {:?}", page.id, page.title),
        None => println!("Sample page: none"),
    }
    Ok(Outcome::Success)
}
