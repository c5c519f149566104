use super::common::{LogLevel, init_logging, load_config};
use camino::Utf8PathBuf;
use catalog_meta::Result;
use catalog_meta::catalog::{RecordStore, acquire_catalog_lock};
use catalog_meta::hosting::{Credentials, EnrichOptions, Enricher, HttpTransport, TokioSleeper};
use chrono::Utc;
use clap::Parser;
use core::time::Duration;
use ohno::bail;

#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Path to configuration file [default: one of catalog.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Root directory of the catalog, overriding the configuration file
    #[arg(long, value_name = "PATH")]
    pub source_directory: Option<Utf8PathBuf>,

    /// Only query repositories whose records lack some metadata
    #[arg(long)]
    pub metadata_only_missing: bool,

    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitLab personal access token
    #[arg(long, value_name = "TOKEN", env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

pub async fn process_catalog(args: &ProcessArgs) -> Result<()> {
    init_logging(args.log_level);

    let mut config = load_config(args.config.as_ref())?;
    if let Some(dir) = &args.source_directory {
        config.source_directory.clone_from(dir);
    }
    if args.metadata_only_missing {
        config.metadata_only_missing = true;
    }

    let _lock = acquire_catalog_lock(&config.source_directory).await?;

    let credentials = Credentials {
        github: args.github_token.clone(),
        gitlab: args.gitlab_token.clone(),
    };
    let transport = HttpTransport::new(Duration::from_secs(config.request_timeout))?;
    let enricher = Enricher::new(
        EnrichOptions::from_config(&config)?,
        credentials,
        transport,
        TokioSleeper,
        Utc::now().date_naive(),
    );

    let report = enricher.run(&RecordStore::new(config.records_path())).await?;
    println!(
        "Queried {} repositories, updated {} records",
        report.considered, report.updated
    );

    if report.is_success() {
        return Ok(());
    }

    eprintln!("\n❌ Errors during processing:");
    for error in &report.errors {
        eprintln!("{error}");
    }
    eprintln!();

    bail!("{} errors occurred during processing", report.errors.len())
}
