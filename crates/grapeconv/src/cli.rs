//! Command-line interface

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = "See --help for the configuration file format.")]
#[command(after_long_help = r#"CONFIGURATION:

The optional TOML configuration file may contain

    station_dir = "/srv/grape/raw"
    output_dir = "/srv/grape/drf"
    channel_name = "ch0"
    compression_level = 0
    subdir_cadence_secs = 3600
    seconds_per_file = 3600

    [beacons]
    WWV5 = 5.0e6
    WWV10 = 10.0e6

If [beacons] is omitted, the standard WWV/WWVH/CHU table is used.
compression_level is only recorded in drf_properties.json; sample
files are always written uncompressed. Command-line options
override the file.

INPUT FILES:

For each DATE, grapeconv reads every regular file in the station
directory whose name begins with DATE and ends with ".csv", in
name order. A day with any decoding error, out-of-order data, or
station configuration change is discarded and reported. The
remaining dates are still processed, but the exit code is 1.
"#)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all logging output
    #[arg(short, long)]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory of station CSV files
    ///
    /// Overrides the configuration file's `station_dir`.
    #[arg(long, value_name = "DIR")]
    pub station_dir: Option<PathBuf>,

    /// Archive root directory
    ///
    /// Overrides the configuration file's `output_dir`.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Dataset identifier stored with each day
    ///
    /// A random identifier is generated if none is given.
    #[arg(long)]
    pub uuid: Option<String>,

    /// Days to convert (YYYY-MM-DD)
    #[arg(value_name = "DATE", required = true, value_parser = parse_date)]
    pub dates: Vec<NaiveDate>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// CLI Error
///
/// Wraps an error and includes the exit code that the process
/// should report.
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Wrap error with exit code
    pub fn new<E>(error: E, exit_code: i32) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            error: error.into(),
            exit_code,
        }
    }

    /// Print error message to stderr
    pub fn print(&self) -> Result<(), std::io::Error> {
        if let Some(clap_err) = self.error.downcast_ref::<clap::Error>() {
            clap_err.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print error and exit
    pub fn exit(&self) -> ! {
        let _ = self.print();
        std::process::exit(self.exit_code)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(error: clap::Error) -> Self {
        let exit_code = if error.use_stderr() { 1 } else { 0 };
        Self::new(error, exit_code)
    }
}
