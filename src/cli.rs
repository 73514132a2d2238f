use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Fusion comp pipeline helpers
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable logging to file (default: fusion_sync.log in the config dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split an output path into head, frame padding and extension
    FramePath {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// List the files a Saver writes for a frame range
    ExpectedFiles {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(long, allow_hyphen_values = true)]
        start: i64,

        #[arg(long, allow_hyphen_values = true)]
        end: i64,

        #[arg(long = "handle-start", default_value_t = 0)]
        handle_start: i64,

        #[arg(long = "handle-end", default_value_t = 0)]
        handle_end: i64,
    },

    /// Print the next free version of a workfile
    VersionUp {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Print the effective settings as JSON
    Settings,
}
