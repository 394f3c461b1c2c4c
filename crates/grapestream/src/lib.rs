//! # grapestream: Grape receiver stream ingestion
//!
//! This crate converts the CSV sample streams written by Grape
//! GPS-disciplined HF receivers ("stations") into a globally
//! time-indexed, calibrated archive. It decodes the stations'
//! line framing, calibrates every sample, detects gaps and
//! out-of-order data, and refuses to mix station configurations
//! within one day.
//!
//! ## Input
//!
//! Stations write one text file per hour. Each file opens with a
//! block of header comments describing the station, followed by
//! one cycle per second:
//!
//! ```txt
//! #,2024-04-08T00:00:00Z,N0001002,FN42el,42.498340,-71.590725,128.6,Harvard MA,Grape 2
//! # …
//! # A/D Sample Rate          8000
//! # A/D Zero Cal Data        7ede,7f07,7f2a
//! T20240408000000L3A1
//! 7EDE,7F07,7F2A
//! …
//! C1A2B3C4DV
//! T20240408000001L3A1
//! …
//! ```
//!
//! Every data row holds one unsigned 16-bit hex sample for each of
//! three channels. The header's zero-calibration words remove each
//! channel's DC bias.
//!
//! ## Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use grapestream::{DirectoryArchive, IngestorBuilder};
//!
//! let ingestor = IngestorBuilder::new()
//!     .with_uuid("9e0e0c6d4bbd4f3c8d7b4f50a0a8c1f2")
//!     .build();
//!
//! let mut archive = DirectoryArchive::new("/srv/grape/drf");
//! archive.with_channel_name("ch0");
//!
//! let day = NaiveDate::from_ymd_opt(2024, 4, 8).unwrap();
//! let files = [
//!     "/srv/grape/raw/2024-04-08T000000Z_N0001002_RAWDATA.csv",
//!     "/srv/grape/raw/2024-04-08T010000Z_N0001002_RAWDATA.csv",
//! ];
//! match ingestor.process_day(day, &files, &mut archive) {
//!     Ok(Some(summary)) => println!("{}", summary),
//!     Ok(None) => println!("no data for {}", day),
//!     Err(e) => eprintln!("day discarded: {}", e),
//! }
//! ```
//!
//! The [`Ingestor`] drives one [`DaySession`] per day. Errors of
//! any kind abort the day and discard everything already written
//! for it. Output goes to any [`Archive`]; [`DirectoryArchive`]
//! is provided.
//!
//! Lower-level pieces are public too: [`FrameKind::classify()`],
//! [`TimestampFrame`], [`ChecksumFrame`], [`HeaderMetadataParser`],
//! [`DataBlockDecoder`], [`ContinuityTracker`], and
//! [`ConfigurationGuard`].

mod archive;
mod beacon;
mod builder;
mod continuity;
mod datablock;
mod frame;
mod guard;
mod header;
mod index;
mod metadata;
mod pipeline;

#[cfg(test)]
mod testdata;

pub use archive::{
    gapped_runs, read_sample_file, Archive, ArchiveError, ArchiveProperties, ArchiveWriter,
    DirectoryArchive, DirectoryWriter,
};
pub use beacon::{BeaconTable, UnknownBeaconError};
pub use builder::IngestorBuilder;
pub use continuity::{
    BlockOffset, ContinuityTracker, FilePlan, OrderingError, WriteMode, SECONDS_PER_FILE,
};
pub use datablock::{decode_row, DataBlock, DataBlockDecoder, DataDecodeError, SampleRow};
pub use frame::{
    ChecksumFrame, FixQuality, FrameDecodeError, FrameKind, GpsLock, TimestampFrame,
};
pub use guard::{
    distance_meters, ConfigurationDriftError, ConfigurationGuard, DistanceFn, EARTH_RADIUS_M,
    MAX_DISPLACEMENT_M,
};
pub use header::{
    canonical_key, ConfigurationRecord, FieldValue, HeaderDecodeError, HeaderError,
    HeaderMetadataParser, HeaderReadError, Position, CHANNELS,
};
pub use index::GlobalSampleIndex;
pub use metadata::{MetadataRecord, SecondMetadata};
pub use pipeline::{
    DaySession, DaySummary, IngestError, Ingestor, PipelineState, SourceLocation,
};
