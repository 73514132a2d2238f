//! Logger setup: console/file for the CLI, the Fusion console when hosted.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{LevelFilter, info};

use crate::entities::FusionApp;

/// Default log file name when `--log` is given without a path.
pub const LOG_FILE: &str = "fusion_sync.log";

/// 0 = warn, 1 = info, 2 = debug, 3+ = trace
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// CLI logging. With `log_file` records go to that file at the requested
/// level, otherwise to stderr honouring `RUST_LOG`.
pub fn init_cli_logging(verbosity: u8, log_file: Option<PathBuf>) -> Result<()> {
    let level = level_for_verbosity(verbosity);

    if let Some(path) = log_file {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .try_init()?;
        info!("Logging to file: {} (level: {:?})", path.display(), level);
    } else {
        let default_level = level.as_str().to_lowercase();
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .try_init()?;
    }
    Ok(())
}

/// Writer that prints every complete line to the host console.
pub struct HostConsole {
    app: Arc<dyn FusionApp>,
    pending: Vec<u8>,
}

impl HostConsole {
    pub fn new(app: Arc<dyn FusionApp>) -> Self {
        Self {
            app,
            pending: Vec::new(),
        }
    }
}

impl Write for HostConsole {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.app.print(&String::from_utf8_lossy(&line));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.app.print(&String::from_utf8_lossy(&rest));
        }
        Ok(())
    }
}

/// Route all records to the Fusion console as `"<message>\n"`.
pub fn init_host_logging(app: Arc<dyn FusionApp>, level: LevelFilter) -> Result<()> {
    env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .target(env_logger::Target::Pipe(Box::new(HostConsole::new(app))))
        .try_init()?;
    Ok(())
}
