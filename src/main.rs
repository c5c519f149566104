//! A tool to keep the repository metadata of a software catalog up to date.
//!
//! # Overview
//!
//! `catalog-meta` works on a directory of YAML records, one file per cataloged piece of software.
//! Every record whose `source_code_url` points at GitHub or GitLab is looked up through that
//! service's GraphQL API, and the record is rewritten with the repository's star count, last
//! commit date, archival status, latest release and, for GitHub, its recent monthly commit
//! counts. All other fields of the record are left as they are.
//!
//! # Quick Start
//!
//! ```bash
//! export GITHUB_TOKEN=...
//! export GITLAB_TOKEN=...
//! catalog-meta process --source-directory path/to/catalog
//! ```
//!
//! Records are read from `<source_directory>/software/*.yml`. A provider without a token is
//! skipped with a warning.
//!
//! # Commands
//!
//! - `process`: query both services and rewrite the records. Problems that only affect some
//!   repositories (unparsable URLs, repositories missing from a response, requests that failed
//!   after every retry) are collected and printed one per line at the end, and the tool exits
//!   with a failure code if there were any.
//! - `stale`: list records whose last commit is more than six months old, flagging those past a
//!   year as stale and those past ten years as abandoned. `--file` reads a single YAML file of
//!   records instead of the catalog.
//! - `init [PATH]`: write the default configuration (`catalog.yml` unless a path is given).
//! - `validate [-c PATH]`: check a configuration file.
//!
//! # Rate Limits
//!
//! Repositories are queried in batches (25 per GitHub query, 10 per GitLab query by default),
//! with `sleep_time` seconds between batches. A batch that fails with a rate-limit or gateway
//! error is retried with exponential backoff and, if it keeps failing, split into smaller
//! batches until individual repositories either succeed or are reported as failed.
//!
//! # Configuration
//!
//! Settings are read from `catalog.toml`, `catalog.yml`, `catalog.yaml` or `catalog.json` in
//! the working directory, or from the file given with `--config`. Run `catalog-meta init` to
//! get a documented starting point.

use catalog_meta::Result;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

mod commands;

use crate::commands::{
    InitArgs, ProcessArgs, StaleArgs, ValidateArgs, init_config, process_catalog, report_stale, validate_config,
};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "catalog-meta", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch repository metadata and update the catalog records
    Process(Box<ProcessArgs>),
    /// Report records whose repositories have not seen a commit in a long time
    Stale(StaleArgs),
    /// Generate a default configuration file
    Init(InitArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        Command::Process(args) => process_catalog(args).await,
        Command::Stale(args) => report_stale(args),
        Command::Init(args) => init_config(args),
        Command::Validate(args) => validate_config(args),
    }
}
