use super::common::print_warnings;
use camino::Utf8PathBuf;
use catalog_meta::Result;
use catalog_meta::config::Config;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file [default: one of catalog.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,
}

#[expect(clippy::unnecessary_wraps, reason = "Consistent interface with other subcommands")]
pub fn validate_config(args: &ValidateArgs) -> Result<()> {
    let base_dir = Utf8PathBuf::from(".");
    let config_path = args.config.as_ref();

    match Config::load(&base_dir, config_path) {
        Ok((config, warnings)) => {
            println!("Configuration validation successful");
            if let Some(path) = config_path {
                println!("Config file: {path}");
            } else {
                println!("Using configuration from the working directory, or the defaults");
            }
            println!("Records directory: {}", config.records_path());

            print_warnings(&warnings);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {e}");
            std::process::exit(1);
        }
    }
}
