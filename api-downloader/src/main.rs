mod config;
mod logging;

use clap::{Args, Parser};
use config::{Config, ConfigError};
use downloader::params::TransferParams;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "api-downloader", about = "Fetch REST API data into object storage as newline JSON")]
enum CliCommand {
    /// Serve transfer requests over HTTP
    Serve(ServeArgs),
    /// Run a single transfer and exit
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long)]
    config_path: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long)]
    config_path: PathBuf,
    /// Transfer parameter as key=value, e.g. --param api_method=GET
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] logging::TelemetryError),
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Downloader(#[from] downloader::DownloaderError),
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    let config_path = match &cli {
        CliCommand::Serve(args) => &args.config_path,
        CliCommand::Run(args) => &args.config_path,
    };
    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", CliError::from(e));
            return ExitCode::FAILURE;
        }
    };

    let _sentry_guard = logging::init_logging(&config.common.logging);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "api downloader failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: CliCommand, config: Config) -> Result<(), CliError> {
    logging::init_metrics(config.common.metrics.as_ref())?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli {
        CliCommand::Serve(_) => {
            tracing::info!("starting api downloader");
            rt.block_on(downloader::run(config.downloader))?;
        }
        CliCommand::Run(args) => {
            let params = TransferParams::from_pairs(args.params);
            let outcome = rt.block_on(downloader::run_once(&config.downloader, params))?;
            println!(
                "uploaded {} records to {}/{}",
                outcome.records, outcome.bucket, outcome.object_name
            );
        }
    }
    Ok(())
}
