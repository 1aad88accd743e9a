//! Resolution of run settings from flags, environment, config file and prompts.
//!
//! Flags and environment variables arrive merged through clap; the config
//! file fills what they leave unset, and prompts fill the rest.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};
use export_logging::export_info;
use exporter_engine::{
    AttachmentPolicy, ExportConfig, FetchSettings, Secret, SiteConfig, DEFAULT_OUTPUT_ROOT,
};
use ron::extensions::Extensions;
use serde::Deserialize;

use crate::cli::Cli;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "confluence_export.ron";

/// Contents of the optional RON config file; every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub url: Option<String>,
    pub email: Option<String>,
    pub token: Option<String>,
    pub space: Option<String>,
    pub output: Option<PathBuf>,
    pub missing_attachments: Option<AttachmentPolicy>,
    pub download_all_attachments: Option<bool>,
    pub attachment_index: Option<bool>,
    pub front_matter: Option<bool>,
    pub max_consecutive_write_failures: Option<u32>,
    pub page_size: Option<u32>,
    pub max_attachment_mb: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        ron::Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(text)
            .map_err(|err| anyhow!("{err}"))
    }

    /// An explicit path must exist; the default file is read only when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config =
            Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))?;
        export_info!("loaded settings from {}", path.display());
        Ok(config)
    }
}

/// Asks the user for a missing value.
pub(crate) trait Prompter {
    fn text(&self, label: &str) -> Result<String>;
    fn secret(&self, label: &str) -> Result<String>;
}

pub(crate) struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn text(&self, label: &str) -> Result<String> {
        Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(label)
            .interact_text()
            .with_context(|| format!("reading {label}"))
    }

    fn secret(&self, label: &str) -> Result<String> {
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(label)
            .interact()
            .with_context(|| format!("reading {label}"))
    }
}

/// Prompting only makes sense with a person at the terminal.
pub(crate) fn terminal_prompter(cli: &Cli) -> Option<TerminalPrompter> {
    (!cli.no_prompt && console::user_attended()).then_some(TerminalPrompter)
}

struct Resolver<'a> {
    prompter: Option<&'a dyn Prompter>,
}

impl Resolver<'_> {
    fn required(
        &self,
        flag: Option<&String>,
        file: Option<&String>,
        label: &str,
        hint: &str,
    ) -> Result<String> {
        if let Some(value) = flag.or(file).filter(|v| !v.trim().is_empty()) {
            return Ok(value.trim().to_string());
        }
        match self.prompter {
            Some(prompter) => Ok(prompter.text(label)?.trim().to_string()),
            None => Err(anyhow!("missing {label}: {hint}")),
        }
    }

    fn token(&self, flag: Option<&String>, file: Option<&String>) -> Result<Secret> {
        if let Some(value) = flag.or(file).filter(|v| !v.trim().is_empty()) {
            return Ok(Secret::new(value.trim()));
        }
        match self.prompter {
            Some(prompter) => Ok(Secret::new(prompter.secret("API token")?.trim())),
            None => Err(anyhow!(
                "missing API token: pass --token or set CONFLUENCE_TOKEN"
            )),
        }
    }
}

pub(crate) fn resolve_site(
    cli: &Cli,
    file: &FileConfig,
    prompter: Option<&dyn Prompter>,
) -> Result<SiteConfig> {
    let resolver = Resolver { prompter };
    let url = resolver.required(
        cli.url.as_ref(),
        file.url.as_ref(),
        "site URL",
        "pass --url or set CONFLUENCE_URL",
    )?;
    let email = resolver.required(
        cli.email.as_ref(),
        file.email.as_ref(),
        "account email",
        "pass --email or set CONFLUENCE_EMAIL",
    )?;
    let token = resolver.token(cli.token.as_ref(), file.token.as_ref())?;
    SiteConfig::new(&url, email, token).context("invalid site settings")
}

/// Space key for the check command, which works without one.
pub(crate) fn optional_space(cli: &Cli, file: &FileConfig) -> Option<String> {
    cli.space
        .clone()
        .or_else(|| file.space.clone())
        .map(|space| space.trim().to_string())
        .filter(|space| !space.is_empty())
}

pub(crate) fn resolve_export(
    cli: &Cli,
    file: &FileConfig,
    prompter: Option<&dyn Prompter>,
) -> Result<ExportConfig> {
    let site = resolve_site(cli, file, prompter)?;
    let space = Resolver { prompter }.required(
        cli.space.as_ref(),
        file.space.as_ref(),
        "space key",
        "pass --space or set CONFLUENCE_SPACE",
    )?;

    let mut config = ExportConfig::new(site, space).context("invalid space key")?;
    config.output_root = cli
        .output
        .clone()
        .or_else(|| file.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT));

    let options = &mut config.options;
    if let Some(policy) = file.missing_attachments {
        options.missing_attachments = policy;
    }
    if cli.fail_on_missing_attachments {
        options.missing_attachments = AttachmentPolicy::Fail;
    }
    if let Some(all) = file.download_all_attachments {
        options.download_all_attachments = all;
    }
    if let Some(index) = file.attachment_index {
        options.attachment_index = index;
    }
    if cli.referenced_attachments_only {
        options.download_all_attachments = false;
        options.attachment_index = false;
    }
    if let Some(front_matter) = file.front_matter {
        options.front_matter = front_matter;
    }
    if cli.no_front_matter {
        options.front_matter = false;
    }
    if let Some(limit) = file.max_consecutive_write_failures {
        config.max_consecutive_write_failures = limit;
    }
    config.fetch = fetch_settings(file);
    Ok(config)
}

pub(crate) fn fetch_settings(file: &FileConfig) -> FetchSettings {
    let mut settings = FetchSettings::default();
    if let Some(page_size) = file.page_size.filter(|n| *n > 0) {
        settings.page_size = page_size;
    }
    if let Some(mb) = file.max_attachment_mb.filter(|n| *n > 0) {
        settings.max_attachment_bytes = mb.saturating_mul(1024 * 1024);
    }
    if let Some(secs) = file.connect_timeout_secs.filter(|n| *n > 0) {
        settings.connect_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.request_timeout_secs.filter(|n| *n > 0) {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(attempts) = file.max_attempts.filter(|n| *n > 0) {
        settings.retry.max_attempts = attempts;
    }
    settings
}
