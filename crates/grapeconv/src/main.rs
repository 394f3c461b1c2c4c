use anyhow::anyhow;
use clap::Parser;
use log::{info, LevelFilter};

mod app;
mod cli;
mod config;

use cli::{Args, CliError};
use config::Config;

fn main() {
    match grapeconv() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn grapeconv() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    let cfg = Config::from_args(&args)?;

    let uuid = match &args.uuid {
        Some(uuid) => uuid.clone(),
        None => uuid::Uuid::new_v4().simple().to_string(),
    };
    info!("dataset identifier: {}", uuid);

    let ingestor = cfg.ingestor(&uuid).build();
    let mut archive = cfg.archive();

    let failed = app::run(&ingestor, &mut archive, &cfg.station_dir, &args.dates);
    if failed.is_empty() {
        Ok(())
    } else {
        let days: Vec<String> = failed.iter().map(|d| d.to_string()).collect();
        Err(CliError::new(
            anyhow!("{} day(s) discarded: {}", failed.len(), days.join(", ")),
            1,
        ))
    }
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("grapestream", log_filter)
            .filter_module("grapeconv", log_filter)
            .init();
    } else {
        // RUST_LOG controls
        pretty_env_logger::init();
    }
}
