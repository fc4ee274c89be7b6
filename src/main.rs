mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use std::fs;
use std::path::{Path, PathBuf};

use cli::Cli;
use face_fetch::config::default_config_path;
use face_fetch::{ConfigLayer, FetchConfig, FetchOutcome, Fetcher};

fn setup_logging(log_dir: Option<&Path>, verbose: bool) -> Result<PathBuf> {
    let log_dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Failed to get base directories"))?
            .data_local_dir()
            .join("face-fetch")
            .join("logs"),
    };

    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", log_dir))?;

    let log_file = log_dir.join(format!(
        "fetch_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));

    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .set_location_level(LevelFilter::Debug)
        .build();

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    WriteLogger::init(level, config, fs::File::create(log_file)?)?;

    Ok(log_dir)
}

fn load_config(cli: &Cli) -> Result<FetchConfig> {
    let file_layer = match &cli.config {
        Some(path) => ConfigLayer::from_file(path)?,
        None => match default_config_path().filter(|path| path.exists()) {
            Some(path) => ConfigLayer::from_file(&path)?,
            None => ConfigLayer::default(),
        },
    };

    let config = file_layer
        .merge(cli.layer())
        .resolve()
        .context("Failed to resolve configuration")?;

    info!("Configuration: {:?}", config);
    Ok(config)
}

fn run(cli: &Cli) -> Result<FetchOutcome> {
    let config = load_config(cli)?;
    let fetcher = Fetcher::new(config)?;
    let outcome = fetcher.fetch()?;
    Ok(outcome)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    // file logging is best effort; the fetch runs without it
    let log_dir = match setup_logging(cli.log_dir.as_deref(), cli.verbose) {
        Ok(dir) => Some(dir),
        Err(e) => {
            eprintln!("warning: file logging disabled: {:#}", e);
            None
        }
    };

    info!("face-fetch starting");

    match run(&cli) {
        // a non-200 status still ends the run normally
        Ok(outcome) => {
            info!("{}", outcome);
            println!("{}", outcome);
            Ok(())
        }
        Err(e) => {
            error!("Fetch failed: {:#}", e);
            eprintln!("fetch failed: {:#}", e);
            if let Some(dir) = &log_dir {
                eprintln!("check logs in {}", dir.display());
            }
            std::process::exit(1);
        }
    }
}
