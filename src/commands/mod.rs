//! Subcommands of the `catalog-meta` tool.

mod common;
mod init;
mod process;
mod stale;
mod validate;

pub use init::{InitArgs, init_config};
pub use process::{ProcessArgs, process_catalog};
pub use stale::{StaleArgs, report_stale};
pub use validate::{ValidateArgs, validate_config};
