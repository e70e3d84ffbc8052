use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use gnss_archive_fetcher::app::{App, RunRequest};
use gnss_archive_fetcher::archive::{Credential, EarthscopeHttpClient};
use gnss_archive_fetcher::catalog::{BoundingBox, UnavcoCatalogClient};
use gnss_archive_fetcher::config::ConfigLoader;
use gnss_archive_fetcher::domain::DateRange;
use gnss_archive_fetcher::error::FetchError;
use gnss_archive_fetcher::output::{JsonOutput, OutputMode, print_human_summary};
use gnss_archive_fetcher::progress::TracingSink;
use gnss_archive_fetcher::resolver::RunMode;

#[derive(Parser)]
#[command(name = "gnss-fetch")]
#[command(about = "Download daily RINEX observation files for GNSS stations in a bounding box")]
#[command(version)]
struct Cli {
    #[arg(long, allow_negative_numbers = true, help = "Minimum latitude of bounding box")]
    min_lat: f64,

    #[arg(long, allow_negative_numbers = true, help = "Maximum latitude of bounding box")]
    max_lat: f64,

    #[arg(long, allow_negative_numbers = true, help = "Minimum longitude of bounding box")]
    min_lon: f64,

    #[arg(long, allow_negative_numbers = true, help = "Maximum longitude of bounding box")]
    max_lon: f64,

    #[arg(long, help = "Text file with station ids (one per line) to restrict the download")]
    stations_file: Option<PathBuf>,

    #[arg(long, help = "Start date YYYY-MM-DD")]
    start_date: String,

    #[arg(long, help = "End date YYYY-MM-DD")]
    end_date: String,

    #[arg(long, default_value = "./rinex_data", help = "Root directory for RINEX files")]
    out_root: Utf8PathBuf,

    #[arg(long, help = "Concurrent downloads (default from config, 5)")]
    workers: Option<usize>,

    #[arg(long, help = "Only log the URLs that would be tried")]
    dry_run: bool,

    #[arg(long, help = "JSON config file (default: ./gnss-fetch.json if present)")]
    config: Option<String>,

    #[arg(long, help = "Print the run summary as JSON on stdout")]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        error if error.is_configuration() => 2,
        FetchError::CatalogHttp(_)
        | FetchError::CatalogStatus { .. }
        | FetchError::CatalogFormat(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let range = DateRange::parse(&cli.start_date, &cli.end_date)?;
    let bbox = BoundingBox::new(cli.min_lat, cli.max_lat, cli.min_lon, cli.max_lon)?;
    let credential = Credential::from_env(&config.token_env)?;

    let catalog = UnavcoCatalogClient::new(&config.catalog_url)?;
    let transport = EarthscopeHttpClient::new(&credential, config.timeout())?;
    let request = RunRequest {
        bbox,
        range,
        stations_file: cli.stations_file,
        out_root: cli.out_root,
        workers: cli.workers,
        mode: if cli.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Download
        },
    };

    let summary = App::new(catalog, transport, config).run(request, &TracingSink)?;

    match output_mode {
        OutputMode::Json => JsonOutput::print_summary(&summary).into_diagnostic()?,
        OutputMode::Human => print_human_summary(&summary).into_diagnostic()?,
    }
    Ok(())
}
