//! Logging and configuration setup shared by the subcommands.

use camino::Utf8PathBuf;
use catalog_meta::Result;
use catalog_meta::config::Config;
use clap::ValueEnum;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace))
        .init();
}

/// Load the configuration from `config_path`, or from the first `catalog.*` file in the working
/// directory, and print any validation warnings
///
/// # Errors
///
/// Returns an error if the configuration cannot be read or is invalid
pub fn load_config(config_path: Option<&Utf8PathBuf>) -> Result<Config> {
    let (config, warnings) = Config::load(&Utf8PathBuf::from("."), config_path)?;
    print_warnings(&warnings);
    Ok(config)
}

pub fn print_warnings(warnings: &[String]) {
    if !warnings.is_empty() {
        eprintln!("\n⚠️  Configuration validation warnings:");
        for warning in warnings {
            eprintln!("   {warning}");
        }
        eprintln!();
    }
}
