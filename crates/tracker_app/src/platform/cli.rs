use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracker_core::DEFAULT_ORIGIN;

/// Starts backend jobs and follows their progress across restarts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// File holding the saved backend base and tracked job ids. Meant for
    /// one process at a time: the tracked list is replaced whole on each
    /// change, so concurrent runs can drop each other's jobs
    #[arg(long, global = true, default_value = ".job_tracker_state.ron")]
    pub state_file: PathBuf,

    /// Backend base URI; replaces the saved one when a job is started
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Origin used when no backend base is configured
    #[arg(long, global = true, default_value = DEFAULT_ORIGIN)]
    pub origin: String,

    /// Directory for archives of completed jobs
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Give up on start, snapshot and download calls after this many seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// One of off, error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Keep logs off the terminal
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a job and follow every tracked job until it finishes
    Start(StartArgs),
    /// Reconcile saved jobs with the backend and follow the ones still running
    Resume,
    /// Show, set or clear the saved backend base
    Endpoint {
        uri: Option<String>,
        #[arg(long, conflicts_with = "uri")]
        clear: bool,
    },
    /// List tracked job ids
    Tracked,
}

/// Where the job parameters come from. Standard input when none is given.
#[derive(Args, Debug, Default)]
#[group(multiple = false)]
pub struct StartArgs {
    /// Job parameters as a JSON object
    #[arg(long)]
    pub payload: Option<String>,

    /// Read job parameters from a file
    #[arg(long)]
    pub payload_file: Option<PathBuf>,

    /// Link whose `#?jsonInput=` fragment carries the job parameters
    #[arg(long)]
    pub prefill: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        let cli = Cli::try_parse_from(["job-tracker", "resume"]).unwrap();
        assert_eq!(cli.origin, DEFAULT_ORIGIN);
        assert_eq!(cli.log_level, "info");
        assert!(cli.backend.is_none());
        assert!(matches!(cli.command, Command::Resume));
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "job-tracker",
            "start",
            "--payload",
            r#"{"x":1}"#,
            "--backend",
            "http://host:9000/",
            "--output-dir",
            "out",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("http://host:9000/"));
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        match cli.command {
            Command::Start(args) => assert_eq!(args.payload.as_deref(), Some(r#"{"x":1}"#)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn payload_sources_are_exclusive() {
        let result = Cli::try_parse_from([
            "job-tracker",
            "start",
            "--payload",
            "{}",
            "--prefill",
            "http://x/#?jsonInput=%7B%7D",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn endpoint_clear_conflicts_with_uri() {
        assert!(Cli::try_parse_from(["job-tracker", "endpoint", "http://a", "--clear"]).is_err());
        let cli = Cli::try_parse_from(["job-tracker", "endpoint", "--clear"]).unwrap();
        assert!(matches!(cli.command, Command::Endpoint { uri: None, clear: true }));
    }
}
