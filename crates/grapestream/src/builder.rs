use crate::beacon::BeaconTable;
use crate::continuity::SECONDS_PER_FILE;
use crate::guard::{ConfigurationGuard, MAX_DISPLACEMENT_M};
use crate::header::HeaderMetadataParser;
use crate::pipeline::Ingestor;

/// Builds an ingestion pipeline
///
/// The builder comes with defaults suited to hourly station
/// files from the standard time-signal beacons. Stations which
/// tune other beacons need a custom
/// [`BeaconTable`](crate::BeaconTable).
///
/// ```
/// use grapestream::{BeaconTable, IngestorBuilder};
///
/// let ingestor = IngestorBuilder::new()
///     .with_beacon_table(BeaconTable::from_iter([("WWV5", 5.0e6)]))
///     .with_seconds_per_file(600)
///     .with_uuid("9e0e0c6d4bbd4f3c8d7b4f50a0a8c1f2")
///     .build();
/// assert_eq!(ingestor.seconds_per_file(), 600);
/// assert_eq!(ingestor.parser().beacon_table().len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct IngestorBuilder {
    beacons: BeaconTable,
    seconds_per_file: usize,
    uuid: Option<String>,
    max_displacement: f64,
}

impl IngestorBuilder {
    /// New pipeline with default options
    pub fn new() -> Self {
        Self {
            beacons: BeaconTable::default(),
            seconds_per_file: SECONDS_PER_FILE,
            uuid: None,
            max_displacement: MAX_DISPLACEMENT_M,
        }
    }

    /// Build the pipeline
    pub fn build(&self) -> Ingestor {
        Ingestor::from(self)
    }

    /// Beacon name → center frequency table
    ///
    /// Every beacon named by a station header must appear in
    /// this table.
    pub fn with_beacon_table(&mut self, beacons: BeaconTable) -> &mut Self {
        self.beacons = beacons;
        self
    }

    /// Nominal seconds of data per station file
    ///
    /// Only files holding exactly this many complete,
    /// consecutive seconds are written contiguously. The
    /// minimum is one.
    pub fn with_seconds_per_file(&mut self, secs: usize) -> &mut Self {
        self.seconds_per_file = secs.max(1);
        self
    }

    /// Dataset identifier stored with each day
    pub fn with_uuid<S: Into<String>>(&mut self, uuid: S) -> &mut Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Permitted station displacement within a day, in meters
    pub fn with_max_displacement(&mut self, meters: f64) -> &mut Self {
        self.max_displacement = f64::max(meters, 0.0);
        self
    }
}

impl Default for IngestorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&IngestorBuilder> for Ingestor {
    fn from(cfg: &IngestorBuilder) -> Self {
        let mut guard = ConfigurationGuard::new();
        guard.with_max_displacement(cfg.max_displacement);

        Self {
            parser: HeaderMetadataParser::new(cfg.beacons.clone()),
            guard,
            seconds_per_file: cfg.seconds_per_file,
            uuid: cfg.uuid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ingestor = IngestorBuilder::default().build();
        assert_eq!(ingestor.seconds_per_file(), 3600);
        assert_eq!(ingestor.uuid(), None);
        assert_eq!(ingestor.guard().max_displacement(), 5.0);
        assert_eq!(ingestor.parser().beacon_table(), &BeaconTable::default());

        let ingestor = IngestorBuilder::new()
            .with_seconds_per_file(0)
            .with_max_displacement(12.5)
            .build();
        assert_eq!(ingestor.seconds_per_file(), 1);
        assert_eq!(ingestor.guard().max_displacement(), 12.5);
    }
}
