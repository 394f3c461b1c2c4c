//! Configuration file
//!
//! The converter reads an optional TOML file. Every key has a
//! default, and command-line options take precedence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use grapestream::{BeaconTable, DirectoryArchive, IngestorBuilder, SECONDS_PER_FILE};

use crate::cli::Args;

/// Converter settings
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of station CSV files
    pub station_dir: PathBuf,

    /// Archive root
    pub output_dir: PathBuf,

    /// Archive channel name
    pub channel_name: String,

    /// Archive compression level, from 0 to 9
    ///
    /// Recorded in the day properties only. Samples are stored
    /// uncompressed.
    pub compression_level: u32,

    /// Seconds per archive subdirectory
    pub subdir_cadence_secs: u32,

    /// Nominal seconds per station file
    pub seconds_per_file: usize,

    /// Beacon name → center frequency (Hz)
    ///
    /// When empty, the standard table is used.
    pub beacons: BTreeMap<String, f64>,
}

impl Config {
    /// Read configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read configuration \"{}\"", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("invalid configuration \"{}\"", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load the configuration named by `args`, if any, and apply overrides
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(dir) = &args.station_dir {
            cfg.station_dir = dir.clone();
        }
        if let Some(dir) = &args.output_dir {
            cfg.output_dir = dir.clone();
        }
        Ok(cfg)
    }

    /// Beacon table for the header parser
    pub fn beacon_table(&self) -> BeaconTable {
        if self.beacons.is_empty() {
            BeaconTable::default()
        } else {
            BeaconTable::from_iter(self.beacons.iter().map(|(k, v)| (k.as_str(), *v)))
        }
    }

    /// Pipeline builder for these settings
    pub fn ingestor(&self, uuid: &str) -> IngestorBuilder {
        let mut builder = IngestorBuilder::new();
        builder
            .with_beacon_table(self.beacon_table())
            .with_seconds_per_file(self.seconds_per_file)
            .with_uuid(uuid);
        builder
    }

    /// Output archive for these settings
    pub fn archive(&self) -> DirectoryArchive {
        let mut archive = DirectoryArchive::new(&self.output_dir);
        archive
            .with_channel_name(self.channel_name.as_str())
            .with_compression_level(self.compression_level)
            .with_subdir_cadence(self.subdir_cadence_secs);
        archive
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            channel_name: "ch0".to_owned(),
            compression_level: 0,
            subdir_cadence_secs: 3600,
            seconds_per_file: SECONDS_PER_FILE,
            beacons: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    #[test]
    fn test_defaults() {
        let cfg = Config::parse("").expect("bad config");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.beacon_table(), BeaconTable::default());
        assert_eq!(cfg.ingestor("x").build().seconds_per_file(), 3600);
    }

    #[test]
    fn test_parse() {
        let cfg = Config::parse(
            r#"
station_dir = "/srv/raw"
channel_name = "grape"
seconds_per_file = 600

[beacons]
WWV5 = 5.0e6
"#,
        )
        .expect("bad config");

        assert_eq!(cfg.station_dir, PathBuf::from("/srv/raw"));
        assert_eq!(cfg.output_dir, PathBuf::from("."));
        assert_eq!(cfg.channel_name, "grape");
        assert_eq!(cfg.seconds_per_file, 600);

        let table = cfg.beacon_table();
        assert_eq!(table.len(), 1);
        assert_eq!(table.frequency("WWV5"), Ok(5.0e6));

        let ingestor = cfg.ingestor("abc").build();
        assert_eq!(ingestor.uuid(), Some("abc"));
        assert_eq!(ingestor.seconds_per_file(), 600);

        assert!(Config::parse("bogus_key = 1").is_err());
        assert!(Config::parse("seconds_per_file = \"many\"").is_err());
    }

    #[test]
    fn test_load_and_override() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let path = dir.path().join("grapeconv.toml");
        std::fs::write(&path, "station_dir = \"/a\"\noutput_dir = \"/b\"\n").expect("write");

        let args = Args::try_parse_from([
            "grapeconv",
            "--config",
            path.to_str().unwrap(),
            "--output-dir",
            "/c",
            "2024-04-08",
        ])
        .expect("bad args");
        let cfg = Config::from_args(&args).expect("bad config");
        assert_eq!(cfg.station_dir, PathBuf::from("/a"));
        assert_eq!(cfg.output_dir, PathBuf::from("/c"));
        assert_eq!(cfg.archive().root(), Path::new("/c"));

        let missing = dir.path().join("missing.toml");
        let err = Config::load(&missing).expect_err("should fail");
        assert!(err.to_string().contains("unable to read configuration"));
    }
}
