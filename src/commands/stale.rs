use super::common::{LogLevel, init_logging, load_config};
use camino::Utf8PathBuf;
use catalog_meta::Result;
use catalog_meta::catalog::{Record, RecordStore, Staleness, StalenessThresholds, load_file, staleness_report};
use chrono::Utc;
use clap::Parser;

const LOG_TARGET: &str = "     stale";

#[derive(Parser, Debug)]
pub struct StaleArgs {
    /// Path to configuration file [default: one of catalog.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Root directory of the catalog, overriding the configuration file
    #[arg(long, value_name = "PATH", conflicts_with = "file")]
    pub source_directory: Option<Utf8PathBuf>,

    /// Read records from one YAML file holding a record or a list of records, instead of the catalog
    #[arg(long, value_name = "PATH")]
    pub file: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

/// Report records whose repositories have gone quiet
///
/// Only reports; never fails because of what it finds.
pub fn report_stale(args: &StaleArgs) -> Result<()> {
    init_logging(args.log_level);

    let mut config = load_config(args.config.as_ref())?;
    if let Some(dir) = &args.source_directory {
        config.source_directory.clone_from(dir);
    }

    let records: Vec<Record> = if let Some(path) = &args.file {
        load_file(path)?
    } else {
        RecordStore::new(config.records_path())
            .load_all()?
            .into_iter()
            .map(|stored| stored.record)
            .collect()
    };

    let thresholds = StalenessThresholds::from_config(&config);
    let entries = staleness_report(&records, Utc::now().date_naive(), &thresholds);

    let (mut abandoned, mut stale, mut aging) = (0, 0, 0);
    for entry in &entries {
        let url = entry.source_code_url.as_deref().unwrap_or("-");
        match entry.staleness {
            Staleness::Abandoned { days } => {
                abandoned += 1;
                log::error!(target: LOG_TARGET, "{}: last updated {} ({days} days ago) - {url}", entry.name, entry.updated_at);
            }
            Staleness::Stale { days } => {
                stale += 1;
                log::warn!(target: LOG_TARGET, "{}: last updated {} ({days} days ago) - {url}", entry.name, entry.updated_at);
            }
            Staleness::Aging { days } => {
                aging += 1;
                log::info!(target: LOG_TARGET, "{}: last updated {} ({days} days ago) - {url}", entry.name, entry.updated_at);
            }
            Staleness::Fresh => {}
        }
    }

    println!(
        "{} records checked: {abandoned} abandoned, {stale} stale, {aging} aging",
        records.len()
    );
    Ok(())
}
