use camino::Utf8PathBuf;
use catalog_meta::Result;
use catalog_meta::config::Config;
use clap::Parser;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output configuration file path; the extension selects the format
    #[arg(value_name = "PATH", default_value = "catalog.yml")]
    pub output: Utf8PathBuf,
}

pub fn init_config(args: &InitArgs) -> Result<()> {
    let config = Config::default();
    config.save_default_with_comments(&args.output)?;
    println!("Generated default configuration file: {}", args.output);
    Ok(())
}
