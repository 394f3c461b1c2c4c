//! Beacon name → center frequency lookup
//!
//! Stations report which time-signal beacons they are tuned to
//! by name. The archive records the carrier frequency of each.
//!
//! | Name     | Frequency (Hz) |
//! |----------|----------------|
//! | `WWV2p5` | 2 500 000      |
//! | `WWV5`   | 5 000 000      |
//! | `WWV10`  | 10 000 000     |
//! | `WWV15`  | 15 000 000     |
//! | `WWV20`  | 20 000 000     |
//! | `WWV25`  | 25 000 000     |
//! | `WWVH2p5`| 2 500 000      |
//! | `WWVH5`  | 5 000 000      |
//! | `WWVH10` | 10 000 000     |
//! | `WWVH15` | 15 000 000     |
//! | `CHU3`   | 3 330 000      |
//! | `CHU7`   | 7 850 000      |
//! | `CHU14`  | 14 670 000     |
//!
//! These are the entries of [`BeaconTable::default()`]. Callers
//! with a different station plan build their own table.

use std::collections::HashMap;

use phf::phf_map;
use thiserror::Error;

/// A beacon name which is not in the frequency table
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
#[error("unknown beacon \"{0}\": no center frequency is known for it")]
pub struct UnknownBeaconError(pub String);

/// Immutable beacon name → center frequency table
///
/// The table is handed to the
/// [`HeaderMetadataParser`](crate::HeaderMetadataParser) when it
/// is constructed and never changes afterwards.
///
/// ```
/// use grapestream::BeaconTable;
///
/// let table = BeaconTable::default();
/// assert_eq!(table.frequency("WWV10"), Ok(10.0e6));
/// assert!(table.frequency("NOPE").is_err());
///
/// let custom = BeaconTable::from_iter([("BEACON_A", 3.5e6)]);
/// assert_eq!(custom.frequency("BEACON_A"), Ok(3.5e6));
/// assert!(custom.frequency("WWV10").is_err());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct BeaconTable {
    frequencies: HashMap<String, f64>,
}

impl BeaconTable {
    /// Center frequency of the named beacon, in Hz
    pub fn frequency(&self, name: &str) -> Result<f64, UnknownBeaconError> {
        self.frequencies
            .get(name)
            .copied()
            .ok_or_else(|| UnknownBeaconError(name.to_owned()))
    }

    /// Center frequencies of each named beacon, in order
    pub fn frequencies<'n, I>(&self, names: I) -> Result<Vec<f64>, UnknownBeaconError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        names.into_iter().map(|n| self.frequency(n)).collect()
    }

    /// Number of known beacons
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// True if no beacons are known
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

impl Default for BeaconTable {
    fn default() -> Self {
        Self::from_iter(STANDARD_BEACONS.entries().map(|(k, v)| (*k, *v)))
    }
}

impl<S> FromIterator<(S, f64)> for BeaconTable
where
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        Self {
            frequencies: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Standard HF time-signal beacons
static STANDARD_BEACONS: phf::Map<&'static str, f64> = phf_map! {
    // NIST Fort Collins
    "WWV2p5" => 2.5e6,
    "WWV5" => 5.0e6,
    "WWV10" => 10.0e6,
    "WWV15" => 15.0e6,
    "WWV20" => 20.0e6,
    "WWV25" => 25.0e6,

    // NIST Kauai
    "WWVH2p5" => 2.5e6,
    "WWVH5" => 5.0e6,
    "WWVH10" => 10.0e6,
    "WWVH15" => 15.0e6,

    // NRC Ottawa
    "CHU3" => 3.33e6,
    "CHU7" => 7.85e6,
    "CHU14" => 14.67e6,
};
