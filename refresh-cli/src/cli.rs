use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::RunOverrides;

#[derive(Parser, Debug)]
#[command(
    name = "pbi-refresh",
    version,
    about = "Trigger Power BI dataset refreshes and wait for them to finish"
)]
pub struct Args {
    /// Configuration file (defaults to <config dir>/pbi-refresh/config.toml)
    #[arg(short, long, global = true, env = "PBI_REFRESH_CONFIG")]
    pub config: Option<PathBuf>,

    /// File holding the latest rotated refresh token
    #[arg(long, global = true, env = "PBI_REFRESH_STATE")]
    pub state: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh the configured datasets
    Run(RunArgs),

    /// List datasets of the configured workspace
    Datasets {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct RunArgs {
    /// Wait until every refresh settles
    #[arg(long, overrides_with = "no_wait")]
    pub wait: bool,

    /// Return as soon as the refreshes are accepted
    #[arg(long, overrides_with = "wait")]
    pub no_wait: bool,

    /// Stop at the first failed refresh
    #[arg(long, overrides_with = "no_fail_fast")]
    pub fail_fast: bool,

    /// Keep polling the remaining refreshes after a failure
    #[arg(long, overrides_with = "fail_fast")]
    pub no_fail_fast: bool,

    /// Maximum time to wait, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Time between polling passes, in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Dataset id to refresh; replaces the configured list (repeatable)
    #[arg(short, long = "dataset", value_name = "ID")]
    pub datasets: Vec<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl RunArgs {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides {
            wait: flag(self.wait, self.no_wait),
            fail_fast: flag(self.fail_fast, self.no_fail_fast),
            timeout_secs: self.timeout,
            interval_secs: self.interval,
            datasets: self.datasets.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let args = Args::try_parse_from(argv).unwrap();
        match args.command {
            Commands::Run(run) => run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn unset_flags_defer_to_configuration() {
        let overrides = run_args(&["pbi-refresh", "run"]).overrides();
        assert_eq!(overrides, RunOverrides::default());
    }

    #[test]
    fn last_wait_flag_wins() {
        let overrides = run_args(&["pbi-refresh", "run", "--wait", "--no-wait"]).overrides();
        assert_eq!(overrides.wait, Some(false));

        let overrides =
            run_args(&["pbi-refresh", "run", "--no-fail-fast", "--fail-fast"]).overrides();
        assert_eq!(overrides.fail_fast, Some(true));
    }

    #[test]
    fn datasets_and_durations_are_collected() {
        let overrides = run_args(&[
            "pbi-refresh",
            "run",
            "-d",
            "a",
            "--dataset",
            "b",
            "--timeout",
            "120",
            "--interval",
            "5",
        ])
        .overrides();
        assert_eq!(overrides.datasets, vec!["a", "b"]);
        assert_eq!(overrides.timeout_secs, Some(120));
        assert_eq!(overrides.interval_secs, Some(5));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(Args::try_parse_from(["pbi-refresh", "run", "--interval", "0"]).is_err());
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let args =
            Args::try_parse_from(["pbi-refresh", "datasets", "--json", "-v", "--state", "s.json"])
                .unwrap();
        assert!(args.verbose);
        assert_eq!(args.state, Some(PathBuf::from("s.json")));
        assert!(matches!(args.command, Commands::Datasets { json: true }));
    }
}
