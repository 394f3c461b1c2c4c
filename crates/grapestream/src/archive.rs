//! Archive-writer capability and a directory-backed archive
//!
//! The ingestion pipeline never touches storage directly. It
//! asks an [`Archive`] for one [`ArchiveWriter`] per processing
//! day and hands it metadata records and sample matrices, each
//! keyed by [`GlobalSampleIndex`].
//!
//! [`DirectoryArchive`] stores each day under its own directory:
//!
//! ```txt
//! <output>/OBS2024-04-08T00-00/
//! └── ch0/
//!     ├── drf_properties.json
//!     ├── 2024-04-08T00-00-00/
//!     │   └── rf@13700275200000.bin
//!     ├── 2024-04-08T01-00-00/
//!     │   └── …
//!     └── metadata/
//!         └── metadata.jsonl
//! ```
//!
//! Sample files hold little-endian `i32` words, one row of
//! three channels after another. Each sample file is named for
//! the index of its first row. Metadata is one JSON object per
//! line, with its index under `sample_index`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::continuity::BlockOffset;
use crate::datablock::SampleRow;
use crate::header::CHANNELS;
use crate::index::GlobalSampleIndex;
use crate::metadata::MetadataRecord;

/// Failure to store archive output
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Filesystem error
    #[error("archive I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metadata could not be serialized
    #[error("archive metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// The request does not describe a valid write
    #[error("invalid archive write: {0}")]
    InvalidWrite(String),

    /// Samples would be stored over samples already written
    #[error("invalid archive write: samples at {current} overlap samples ending at {previous_end}")]
    Overlap {
        /// One past the last row already placed
        previous_end: GlobalSampleIndex,
        /// Index of the offending write
        current: GlobalSampleIndex,
    },

    /// The day writer was already closed or discarded
    #[error("archive day writer is closed")]
    Closed,
}

/// Fixed properties of one archived day
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArchiveProperties {
    /// Samples per second
    pub sample_rate: u32,

    /// Index of the day's first sample
    pub start_index: GlobalSampleIndex,

    /// Dataset identifier
    #[serde(rename = "uuid_str", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Number of channels per row
    #[serde(rename = "num_subchannels")]
    pub channels: usize,
}

impl ArchiveProperties {
    /// Properties for a day at `sample_rate`
    pub fn new(sample_rate: u32, start_index: GlobalSampleIndex) -> Self {
        Self {
            sample_rate,
            start_index,
            uuid: None,
            channels: CHANNELS,
        }
    }

    /// Attach a dataset identifier
    pub fn with_uuid(mut self, uuid: Option<String>) -> Self {
        self.uuid = uuid;
        self
    }
}

/// Writes one day of archive output
pub trait ArchiveWriter {
    /// Store a metadata record at `index`
    fn write_metadata(
        &mut self,
        index: GlobalSampleIndex,
        record: &MetadataRecord,
    ) -> Result<(), ArchiveError>;

    /// Store a contiguous run of rows beginning at `start`
    fn write_samples(
        &mut self,
        start: GlobalSampleIndex,
        samples: &[SampleRow],
    ) -> Result<(), ArchiveError>;

    /// Store rows with gaps between blocks
    ///
    /// Each [`BlockOffset`] places the rows from its `row` up
    /// to the next block's `row` (or the end of `samples`) at
    /// its `index`.
    fn write_samples_gapped(
        &mut self,
        samples: &[SampleRow],
        blocks: &[BlockOffset],
    ) -> Result<(), ArchiveError>;

    /// Flush and close the day's output
    fn close(&mut self) -> Result<(), ArchiveError>;

    /// Remove everything written for the day
    fn discard(&mut self) -> Result<(), ArchiveError>;
}

/// Opens per-day writers
pub trait Archive {
    /// Writer type for one day
    type Writer: ArchiveWriter;

    /// Begin a day's output
    ///
    /// Any output previously stored for `day` is replaced.
    fn open_day(
        &mut self,
        day: NaiveDate,
        properties: &ArchiveProperties,
    ) -> Result<Self::Writer, ArchiveError>;
}

/// Split gapped rows into `(index, rows)` runs
///
/// Adjacent blocks which abut in the archive are merged into
/// a single run. A block which holds more rows than fit before
/// its successor is an [`ArchiveError::Overlap`].
pub fn gapped_runs<'s>(
    samples: &'s [SampleRow],
    blocks: &[BlockOffset],
) -> Result<Vec<(GlobalSampleIndex, &'s [SampleRow])>, ArchiveError> {
    let mut runs: Vec<(GlobalSampleIndex, &'s [SampleRow])> = Vec::new();

    match blocks.first() {
        None if samples.is_empty() => return Ok(runs),
        None => {
            return Err(ArchiveError::InvalidWrite(format!(
                "{} rows without block offsets",
                samples.len()
            )))
        }
        Some(first) if first.row != 0 => {
            return Err(ArchiveError::InvalidWrite(format!(
                "first block begins at row {}",
                first.row
            )))
        }
        Some(_) => {}
    }

    // (index, first row) of the run being built
    let mut run: Option<(GlobalSampleIndex, usize)> = None;
    for (i, block) in blocks.iter().enumerate() {
        let next = blocks.get(i + 1);
        let end = next.map(|b| b.row).unwrap_or(samples.len());
        if end < block.row || end > samples.len() {
            return Err(ArchiveError::InvalidWrite(format!(
                "block at row {} ends at row {} of {}",
                block.row,
                end,
                samples.len()
            )));
        }

        let (run_index, run_start) = *run.get_or_insert((block.index, block.row));
        let block_end = block.index.offset(end - block.row);
        if let Some(n) = next.filter(|n| n.index < block_end) {
            return Err(ArchiveError::Overlap {
                previous_end: block_end,
                current: n.index,
            });
        }
        let abuts = next.map_or(false, |n| n.index == block_end);
        if !abuts {
            if end > run_start {
                runs.push((run_index, &samples[run_start..end]));
            }
            run = None;
        }
    }
    Ok(runs)
}

/// Directory-backed archive
///
/// ```no_run
/// use grapestream::DirectoryArchive;
///
/// let mut archive = DirectoryArchive::new("/srv/grape/drf");
/// archive
///     .with_channel_name("ch0")
///     .with_compression_level(9)
///     .with_subdir_cadence(3600);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryArchive {
    root: PathBuf,
    channel_name: String,
    compression_level: u32,
    subdir_cadence_secs: u32,
}

impl DirectoryArchive {
    /// Archive rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            channel_name: "ch0".to_owned(),
            compression_level: 0,
            subdir_cadence_secs: 3600,
        }
    }

    /// Channel directory name within each day
    pub fn with_channel_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.channel_name = name.into();
        self
    }

    /// Compression level recorded in the day properties
    ///
    /// The level is stored in `drf_properties.json` for readers
    /// of the archive. Sample files are always written
    /// uncompressed.
    pub fn with_compression_level(&mut self, level: u32) -> &mut Self {
        self.compression_level = level;
        self
    }

    /// Seconds of samples per sub-directory
    ///
    /// Values below one second are raised to one.
    pub fn with_subdir_cadence(&mut self, secs: u32) -> &mut Self {
        self.subdir_cadence_secs = secs.max(1);
        self
    }

    /// Archive root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all output for `day`
    pub fn day_dir(&self, day: NaiveDate) -> PathBuf {
        self.root.join(format!("OBS{}T00-00", day.format("%Y-%m-%d")))
    }

    /// Channel directory for `day`
    pub fn channel_dir(&self, day: NaiveDate) -> PathBuf {
        self.day_dir(day).join(&self.channel_name)
    }
}

impl Archive for DirectoryArchive {
    type Writer = DirectoryWriter;

    fn open_day(
        &mut self,
        day: NaiveDate,
        properties: &ArchiveProperties,
    ) -> Result<DirectoryWriter, ArchiveError> {
        let day_dir = self.day_dir(day);
        if day_dir.exists() {
            warn!("{}: removing existing output", day_dir.display());
            fs::remove_dir_all(&day_dir)?;
        }

        let channel_dir = self.channel_dir(day);
        let metadata_dir = channel_dir.join(METADATA_DIR);
        fs::create_dir_all(&metadata_dir)?;

        let drf = DrfProperties {
            properties,
            channel_name: &self.channel_name,
            compression_level: self.compression_level,
            subdir_cadence_secs: self.subdir_cadence_secs,
            dtype: DTYPE,
            is_complex: false,
        };
        let mut out = BufWriter::new(File::create(channel_dir.join(PROPERTIES_FILE))?);
        serde_json::to_writer_pretty(&mut out, &drf)?;
        out.flush()?;

        let metadata = BufWriter::new(File::create(metadata_dir.join(METADATA_FILE))?);

        info!(
            "{}: opened day at sample {} ({} Hz)",
            day_dir.display(),
            properties.start_index,
            properties.sample_rate
        );

        Ok(DirectoryWriter {
            day_dir,
            channel_dir,
            sample_rate: properties.sample_rate,
            subdir_cadence_secs: self.subdir_cadence_secs,
            written_end: None,
            metadata: Some(metadata),
        })
    }
}

/// Writes one day into a [`DirectoryArchive`]
#[derive(Debug)]
pub struct DirectoryWriter {
    day_dir: PathBuf,
    channel_dir: PathBuf,
    sample_rate: u32,
    subdir_cadence_secs: u32,
    // one past the last row written
    written_end: Option<GlobalSampleIndex>,
    metadata: Option<BufWriter<File>>,
}

impl DirectoryWriter {
    /// Directory holding the day's output
    pub fn day_dir(&self) -> &Path {
        &self.day_dir
    }

    // Write one run, split at sub-directory boundaries
    //
    // Runs must not reach back over rows already written.
    fn write_run(&mut self, start: GlobalSampleIndex, samples: &[SampleRow]) -> Result<(), ArchiveError> {
        match self.written_end {
            Some(previous_end) if start < previous_end => {
                return Err(ArchiveError::Overlap {
                    previous_end,
                    current: start,
                })
            }
            _ => {}
        }
        if samples.is_empty() {
            return Ok(());
        }
        self.written_end = Some(start.offset(samples.len()));

        let rate = self.sample_rate as i64;
        let cadence = self.subdir_cadence_secs as i64;

        let mut index = start;
        let mut rest = samples;
        while !rest.is_empty() {
            let subdir_secs = index.epoch_seconds(self.sample_rate).div_euclid(cadence) * cadence;
            let boundary = GlobalSampleIndex::new((subdir_secs + cadence) * rate);
            let take = (boundary.since(index) as usize).min(rest.len());
            let (chunk, tail) = rest.split_at(take);

            let subdir = self.channel_dir.join(subdir_name(subdir_secs)?);
            fs::create_dir_all(&subdir)?;
            let path = subdir.join(format!("rf@{}.bin", index));
            write_sample_file(&path, chunk)?;
            debug!("{}: {} rows", path.display(), chunk.len());

            index = index.offset(take);
            rest = tail;
        }
        Ok(())
    }
}

impl ArchiveWriter for DirectoryWriter {
    fn write_metadata(
        &mut self,
        index: GlobalSampleIndex,
        record: &MetadataRecord,
    ) -> Result<(), ArchiveError> {
        let out = self.metadata.as_mut().ok_or(ArchiveError::Closed)?;

        let mut obj = Map::new();
        obj.insert("sample_index".into(), Value::from(index.value()));
        obj.extend(record.to_map());
        serde_json::to_writer(&mut *out, &Value::Object(obj))?;
        out.write_all(b"\n")?;
        Ok(())
    }

    fn write_samples(
        &mut self,
        start: GlobalSampleIndex,
        samples: &[SampleRow],
    ) -> Result<(), ArchiveError> {
        if self.metadata.is_none() {
            return Err(ArchiveError::Closed);
        }
        self.write_run(start, samples)
    }

    fn write_samples_gapped(
        &mut self,
        samples: &[SampleRow],
        blocks: &[BlockOffset],
    ) -> Result<(), ArchiveError> {
        if self.metadata.is_none() {
            return Err(ArchiveError::Closed);
        }
        for (start, run) in gapped_runs(samples, blocks)? {
            self.write_run(start, run)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), ArchiveError> {
        if let Some(mut out) = self.metadata.take() {
            out.flush()?;
        }
        Ok(())
    }

    fn discard(&mut self) -> Result<(), ArchiveError> {
        self.metadata = None;
        if self.day_dir.exists() {
            warn!("{}: discarding day output", self.day_dir.display());
            fs::remove_dir_all(&self.day_dir)?;
        }
        Ok(())
    }
}

/// Read back a sample file
pub fn read_sample_file<P: AsRef<Path>>(path: P) -> Result<Vec<SampleRow>, ArchiveError> {
    let mut bytes = Vec::new();
    File::open(path.as_ref())?.read_to_end(&mut bytes)?;

    const ROW_BYTES: usize = CHANNELS * 4;
    if bytes.len() % ROW_BYTES != 0 {
        return Err(ArchiveError::InvalidWrite(format!(
            "{}: {} bytes is not a whole number of rows",
            path.as_ref().display(),
            bytes.len()
        )));
    }

    let mut words = vec![0i32; bytes.len() / 4];
    let mut rdr = &bytes[..];
    rdr.read_i32_into::<LittleEndian>(&mut words)?;
    Ok(words
        .chunks_exact(CHANNELS)
        .map(|c| [c[0], c[1], c[2]])
        .collect())
}

fn write_sample_file(path: &Path, samples: &[SampleRow]) -> Result<(), ArchiveError> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in samples {
        for word in row {
            out.write_i32::<LittleEndian>(*word)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn subdir_name(epoch_secs: i64) -> Result<String, ArchiveError> {
    let at = DateTime::from_timestamp(epoch_secs, 0).ok_or_else(|| {
        ArchiveError::InvalidWrite(format!("epoch second {} is out of range", epoch_secs))
    })?;
    Ok(at.format("%Y-%m-%dT%H-%M-%S").to_string())
}

// contents of the day properties file
#[derive(Serialize)]
struct DrfProperties<'a> {
    #[serde(flatten)]
    properties: &'a ArchiveProperties,
    channel_name: &'a str,
    compression_level: u32,
    subdir_cadence_secs: u32,
    dtype: &'static str,
    is_complex: bool,
}

const DTYPE: &str = "<i4";
const PROPERTIES_FILE: &str = "drf_properties.json";
const METADATA_DIR: &str = "metadata";
const METADATA_FILE: &str = "metadata.jsonl";
