//! Logging initialization for the command-line front end.
//!
//! Terminal logs go to stderr so job output on stdout stays readable.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Destination for log output.
pub enum LogDestination {
    /// Write to the given file only.
    File(PathBuf),
    /// Write to the terminal (stderr).
    Terminal,
    /// Write to both the file and the terminal.
    Both(PathBuf),
}

impl LogDestination {
    /// `None` when the terminal is silenced and no file was requested.
    pub fn choose(log_file: Option<&Path>, quiet: bool) -> Option<Self> {
        match (log_file, quiet) {
            (Some(path), true) => Some(LogDestination::File(path.to_path_buf())),
            (Some(path), false) => Some(LogDestination::Both(path.to_path_buf())),
            (None, false) => Some(LogDestination::Terminal),
            (None, true) => None,
        }
    }
}

/// Initialize the logger with the specified destination and level name.
///
/// An unknown level name falls back to `info`. A file that cannot be
/// created is reported on stderr and skipped.
pub fn initialize(destination: LogDestination, level_name: &str) {
    let level = tracker_logging::level_from_name(level_name);
    let config = build_config();

    let loggers: Vec<Box<dyn SharedLogger>> = match destination {
        LogDestination::File(path) => match create_file_logger(&path, level, config) {
            Some(file_logger) => vec![file_logger],
            None => return,
        },
        LogDestination::Terminal => vec![terminal_logger(level, config)],
        LogDestination::Both(path) => {
            let mut loggers: Vec<Box<dyn SharedLogger>> =
                vec![terminal_logger(level, config.clone())];
            if let Some(file_logger) = create_file_logger(&path, level, config) {
                loggers.push(file_logger);
            }
            loggers
        }
    };

    let _ = CombinedLogger::init(loggers);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn terminal_logger(level: LevelFilter, config: Config) -> Box<TermLogger> {
    TermLogger::new(level, config, TerminalMode::Stderr, ColorChoice::Auto)
}

fn create_file_logger(
    path: &Path,
    level: LevelFilter,
    config: Config,
) -> Option<Box<WriteLogger<File>>> {
    match File::create(path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", path, err);
            None
        }
    }
}
