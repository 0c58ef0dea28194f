pub use clap::Parser;

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "dweb")]
#[command(about = "Signed, content-addressed objects and the names that point at them")]
pub struct Args {
    /// Path to the dweb state directory (defaults to ~/.dweb)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Default log level; RUST_LOG overrides it
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub command: crate::Command,
}
