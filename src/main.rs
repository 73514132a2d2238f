use fusion_sync::cli::{Args, Command};
use fusion_sync::config::{PathConfig, Settings};
use fusion_sync::core::workfile::version_up;
use fusion_sync::entities::FrameRange;
use fusion_sync::logging::{self, LOG_FILE};
use fusion_sync::utils::sequences::{expected_files, split_frame_path};

use anyhow::Result;
use clap::Parser;
use log::{debug, warn};

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if args.log_file.is_some() {
        if let Err(e) = path_config.ensure_dirs() {
            eprintln!("Warning: Failed to create config directory: {}", e);
        }
    }

    let log_path = args
        .log_file
        .clone()
        .map(|path| path.unwrap_or_else(|| path_config.config_file(LOG_FILE)));
    logging::init_cli_logging(args.verbosity, log_path)?;
    debug!("Command-line args: {:?}", args);
    debug!("Config dir: {}", path_config.config_dir().display());

    match args.command {
        Command::FramePath { path } => {
            let split = split_frame_path(&path);
            println!("head:    {}", split.head);
            println!("padding: {}", split.padding);
            println!("ext:     {}", split.ext);
        }
        Command::ExpectedFiles {
            path,
            start,
            end,
            handle_start,
            handle_end,
        } => {
            let range = FrameRange::new(start, end, handle_start, handle_end);
            let files = expected_files(&path, &range);
            if files.is_empty() {
                warn!(
                    "Empty frame range {}-{}",
                    range.start_with_handles(),
                    range.end_with_handles()
                );
            }
            for file in files {
                println!("{}", file);
            }
        }
        Command::VersionUp { path } => {
            let next = version_up(&path)?;
            println!("{}", next.display());
        }
        Command::Settings => {
            let settings = Settings::load(&path_config)?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }

    Ok(())
}
