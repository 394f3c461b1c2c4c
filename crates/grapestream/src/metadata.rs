//! Archive metadata records

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::datablock::DataBlock;
use crate::frame::{ChecksumFrame, GpsLock, TimestampFrame};
use crate::header::ConfigurationRecord;

/// Per-second frame fields
///
/// Captured from the timestamp and checksum frames which
/// bracket each block.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SecondMetadata {
    /// Block time as transmitted, `YYYYMMDDhhmmss`
    pub timestamp: String,

    /// GPS lock flag
    pub gps_lock: GpsLock,

    /// GPS fix quality code
    pub gps_fix: u8,

    /// Satellites in view
    pub sat_count: u8,

    /// Position dilution of precision
    pub pdop: u8,

    /// Station checksum over the block
    pub checksum: String,

    /// Verification flag
    pub verify: char,
}

impl SecondMetadata {
    /// Fields from a block's bracketing frames
    pub fn from_frames(timestamp: &TimestampFrame, checksum: &ChecksumFrame) -> Self {
        Self {
            timestamp: timestamp.time_str(),
            gps_lock: timestamp.gps_lock(),
            gps_fix: timestamp.fix().code(),
            sat_count: timestamp.satellites(),
            pdop: timestamp.dop(),
            checksum: checksum.checksum().to_owned(),
            verify: checksum.verify(),
        }
    }

    /// Fields of a closed block
    pub fn from_block(block: &DataBlock) -> Self {
        Self::from_frames(block.timestamp(), block.checksum())
    }

    fn insert_into(&self, out: &mut Map<String, Value>) {
        let lock: &'static str = self.gps_lock.into();
        out.insert("timestamp".into(), json!(self.timestamp));
        out.insert("gps_lock".into(), json!(lock));
        out.insert("gps_fix".into(), json!(self.gps_fix));
        out.insert("sat_count".into(), json!(self.sat_count));
        out.insert("pdop".into(), json!(self.pdop));
        out.insert("checksum".into(), json!(self.checksum));
        out.insert("verify".into(), json!(self.verify.to_string()));
    }
}

/// One metadata record, stored at a block's index
///
/// The first block of a day carries the day's full station
/// configuration. Every later block carries only its own
/// frame fields.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataRecord {
    /// First block of the day
    DayStart {
        /// Dataset identifier, if one was assigned
        uuid: Option<String>,

        /// Day's accepted configuration
        config: Box<ConfigurationRecord>,

        /// Frame fields of the first block
        second: SecondMetadata,
    },

    /// Any later block
    Second(SecondMetadata),
}

impl MetadataRecord {
    /// Frame fields of the record's block
    pub fn second(&self) -> &SecondMetadata {
        match self {
            MetadataRecord::DayStart { second, .. } => second,
            MetadataRecord::Second(second) => second,
        }
    }

    /// True for the first record of a day
    pub fn is_day_start(&self) -> bool {
        matches!(self, MetadataRecord::DayStart { .. })
    }

    /// Flatten to a single key/value map
    ///
    /// For a day start, configuration fields come first and
    /// frame fields overwrite any configuration field with
    /// the same key.
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            MetadataRecord::DayStart {
                uuid,
                config,
                second,
            } => {
                let mut out = config.to_map();
                if let Some(uuid) = uuid {
                    out.insert("uuid_str".into(), json!(uuid));
                }
                second.insert_into(&mut out);
                out
            }
            MetadataRecord::Second(second) => {
                let mut out = Map::new();
                second.insert_into(&mut out);
                out
            }
        }
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_map().serialize(serializer)
    }
}
