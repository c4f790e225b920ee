use std::path::PathBuf;
use std::process;

use clap::Parser;
use pbi_refresh::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
    error::{AppError, Result},
    state::StateStore,
};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;
    let state = StateStore::new(state_path(args.state)?);
    let executor = CommandExecutor::new(config, state)?;

    match args.command {
        Commands::Run(run) => {
            let report = executor.run_refresh(&run.overrides()).await?;
            if run.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            report.into_result()?;
            info!("Power BI refresh finished");
        }
        Commands::Datasets { json } => executor.list_datasets(json).await?,
    }
    Ok(())
}

fn state_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit.or_else(StateStore::default_path).ok_or_else(|| {
        AppError::invalid_config("no local data directory available; pass --state")
    })
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose).with_writer(std::io::stderr))
        .init();
}
