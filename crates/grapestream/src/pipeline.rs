//! Per-day ingestion state machine
//!
//! A [`DaySession`] consumes the station files of one calendar
//! day, in order, and emits the day's archive output:
//!
//! ```txt
//!          ┌──────────────── next file ───────────────┐
//!          ▼                                          │
//! Idle ─► HeaderPending ──header accepted──► Streaming ┴─finish─► Closed
//!               │                              │
//!               └──────────── any error ───────┴──────────────► Aborted
//! ```
//!
//! * **HeaderPending**: the file's header is parsed. The
//!   first header of the day opens the archive writer. Every
//!   later header must pass the [`ConfigurationGuard`].
//! * **Streaming**: each closed block is placed by the
//!   [`ContinuityTracker`] and its metadata record is written
//!   immediately. At end of file, the file's samples are
//!   written in one piece if the file was contiguous, or
//!   block by block if it was not. Each block is a timestamp
//!   frame, its data rows, and a checksum frame. A row or
//!   checksum outside a block, or a block left without its
//!   checksum, is a framing error.
//! * **Aborted**: any error discards all of the day's output
//!   before it is returned. The session accepts no more input.
//!
//! A file's decoded rows are held in memory until the file
//! ends, since contiguity is only known then. A full hour at
//! 8 kHz is 28.8 million rows, about 345 MB.
//!
//! [`ConfigurationGuard`]: crate::ConfigurationGuard
//! [`ContinuityTracker`]: crate::ContinuityTracker

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[cfg(not(test))]
use log::{debug, info, trace, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as trace;
#[cfg(test)]
use std::println as warn;

use chrono::NaiveDate;
use thiserror::Error;

use crate::archive::{Archive, ArchiveError, ArchiveProperties, ArchiveWriter};
use crate::beacon::UnknownBeaconError;
use crate::continuity::{ContinuityTracker, OrderingError, WriteMode};
use crate::datablock::{DataBlock, DataBlockDecoder, DataDecodeError, SampleRow};
use crate::frame::{ChecksumFrame, FrameDecodeError, FrameKind, TimestampFrame};
use crate::guard::{ConfigurationDriftError, ConfigurationGuard};
use crate::header::{
    ConfigurationRecord, HeaderDecodeError, HeaderError, HeaderMetadataParser, HeaderReadError,
};
use crate::index::GlobalSampleIndex;
use crate::metadata::{MetadataRecord, SecondMetadata};

/// State of a [`DaySession`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum PipelineState {
    /// No input yet
    #[strum(serialize = "idle")]
    Idle,

    /// Reading a file's header
    #[strum(serialize = "header pending")]
    HeaderPending,

    /// Reading a file's data blocks
    #[strum(serialize = "streaming")]
    Streaming,

    /// Day completed successfully
    #[strum(serialize = "closed")]
    Closed,

    /// Day failed and its output was discarded
    #[strum(serialize = "aborted")]
    Aborted,
}

impl PipelineState {
    /// True if the session accepts no further input
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Closed | PipelineState::Aborted)
    }
}

/// Where in the input an error occurred
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Input file name
    pub file: String,

    /// Line number, starting from 1
    pub line: usize,

    /// Index of the enclosing block, if known
    pub block_start: Option<GlobalSampleIndex>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if let Some(idx) = self.block_start {
            write!(f, " (block at sample {})", idx)?;
        }
        Ok(())
    }
}

/// A fatal error while ingesting a day
///
/// The day's archive output has already been discarded by the
/// time this error is returned.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Malformed header
    #[error("{location}: {source}")]
    HeaderDecode {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: HeaderDecodeError,
    },

    /// Header names a beacon with no known frequency
    #[error("{location}: {source}")]
    UnknownBeacon {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: UnknownBeaconError,
    },

    /// Malformed frame, or a block which is not properly framed
    #[error("{location}: {source}")]
    FrameDecode {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: FrameDecodeError,
    },

    /// Malformed data row
    #[error("{location}: {source}")]
    DataDecode {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: DataDecodeError,
    },

    /// Station configuration changed during the day
    #[error("{location}: {source}")]
    ConfigurationDrift {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: ConfigurationDriftError,
    },

    /// Block out of order
    #[error("{location}: {source}")]
    Ordering {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: OrderingError,
    },

    /// Input could not be read
    #[error("{location}: unable to read input: {source}")]
    Read {
        /// Error location
        location: SourceLocation,
        /// Cause
        source: std::io::Error,
    },

    /// Archive output could not be stored
    #[error("day {day}: {source}")]
    Archive {
        /// Day being written
        day: NaiveDate,
        /// Cause
        source: ArchiveError,
    },

    /// Session has already been closed or aborted
    #[error("day {day}: session is {state}; no further input accepted")]
    Finished {
        /// Day of the session
        day: NaiveDate,
        /// Terminal state
        state: PipelineState,
    },
}

impl IngestError {
    /// Input location of the error, if it has one
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            IngestError::HeaderDecode { location, .. }
            | IngestError::UnknownBeacon { location, .. }
            | IngestError::FrameDecode { location, .. }
            | IngestError::DataDecode { location, .. }
            | IngestError::ConfigurationDrift { location, .. }
            | IngestError::Ordering { location, .. }
            | IngestError::Read { location, .. } => Some(location),
            IngestError::Archive { .. } | IngestError::Finished { .. } => None,
        }
    }

    fn from_header(err: HeaderReadError, mut location: SourceLocation) -> Self {
        match err {
            HeaderReadError::Io(source) => IngestError::Read { location, source },
            HeaderReadError::Header { source, line } => {
                location.line = line;
                match source {
                    HeaderError::Decode(source) => IngestError::HeaderDecode { location, source },
                    HeaderError::UnknownBeacon(source) => {
                        IngestError::UnknownBeacon { location, source }
                    }
                }
            }
        }
    }
}

/// Totals for one ingested day
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaySummary {
    /// Processing day
    pub day: NaiveDate,

    /// Files ingested
    pub files: usize,

    /// Blocks accepted
    pub blocks: usize,

    /// Sample rows written
    pub rows: usize,

    /// Files written in one contiguous piece
    pub contiguous_files: usize,

    /// Files written block by block
    pub gapped_files: usize,

    /// Index of the first accepted block
    pub first_index: Option<GlobalSampleIndex>,

    /// Index of the last accepted block
    pub last_index: Option<GlobalSampleIndex>,
}

impl DaySummary {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            files: 0,
            blocks: 0,
            rows: 0,
            contiguous_files: 0,
            gapped_files: 0,
            first_index: None,
            last_index: None,
        }
    }
}

impl fmt::Display for DaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} files, {} blocks, {} rows ({} contiguous, {} gapped)",
            self.day,
            self.files,
            self.blocks,
            self.rows,
            self.contiguous_files,
            self.gapped_files
        )
    }
}

/// Converts station files into archive output
///
/// Build one with [`IngestorBuilder`](crate::IngestorBuilder).
/// An `Ingestor` holds no per-day state and may process any
/// number of days.
#[derive(Clone, Debug)]
pub struct Ingestor {
    pub(crate) parser: HeaderMetadataParser,
    pub(crate) guard: ConfigurationGuard,
    pub(crate) seconds_per_file: usize,
    pub(crate) uuid: Option<String>,
}

impl Ingestor {
    /// Header parser
    pub fn parser(&self) -> &HeaderMetadataParser {
        &self.parser
    }

    /// Configuration guard
    pub fn guard(&self) -> &ConfigurationGuard {
        &self.guard
    }

    /// Nominal seconds of data per file
    pub fn seconds_per_file(&self) -> usize {
        self.seconds_per_file
    }

    /// Dataset identifier
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Start a session for `day`
    ///
    /// Nothing is written to `archive` until the session
    /// accepts its first header.
    pub fn begin_day<'a, A: Archive>(&'a self, day: NaiveDate, archive: &'a mut A) -> DaySession<'a, A> {
        DaySession {
            ingestor: self,
            archive,
            day,
            state: PipelineState::Idle,
            open: None,
        }
    }

    /// Ingest one day's files, in order
    ///
    /// Returns `Ok(None)` if there are no files for the day.
    /// On error, the day's output has been discarded.
    pub fn process_day<A, P>(
        &self,
        day: NaiveDate,
        files: &[P],
        archive: &mut A,
    ) -> Result<Option<DaySummary>, IngestError>
    where
        A: Archive,
        P: AsRef<Path>,
    {
        if files.is_empty() {
            warn!("{}: no input files; skipping day", day);
            return Ok(None);
        }

        let mut session = self.begin_day(day, archive);
        for file in files {
            session.ingest_file(file.as_ref())?;
        }
        session.finish()
    }
}

/// Ingestion of one station-day
pub struct DaySession<'a, A: Archive> {
    ingestor: &'a Ingestor,
    archive: &'a mut A,
    day: NaiveDate,
    state: PipelineState,
    open: Option<OpenDay<A::Writer>>,
}

impl<'a, A: Archive> DaySession<'a, A> {
    /// Processing day
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The day's accepted configuration, once known
    pub fn accepted(&self) -> Option<&ConfigurationRecord> {
        self.open.as_ref().map(|o| &o.accepted)
    }

    /// Totals so far, once a header has been accepted
    pub fn summary(&self) -> Option<&DaySummary> {
        self.open.as_ref().map(|o| &o.summary)
    }

    /// Ingest one station file from disk
    pub fn ingest_file(&mut self, path: &Path) -> Result<(), IngestError> {
        let name = path.display().to_string();
        if self.state.is_terminal() {
            return Err(self.finished());
        }

        info!("{}: reading {}", self.day, name);
        match File::open(path) {
            Ok(file) => self.ingest_reader(&name, BufReader::with_capacity(READ_BUFFER, file)),
            Err(source) => {
                self.abort();
                Err(IngestError::Read {
                    location: SourceLocation {
                        file: name,
                        line: 1,
                        block_start: None,
                    },
                    source,
                })
            }
        }
    }

    /// Ingest one station file from a stream
    ///
    /// `name` identifies the input in log messages and errors.
    pub fn ingest_reader<R: BufRead>(&mut self, name: &str, reader: R) -> Result<(), IngestError> {
        if self.state.is_terminal() {
            return Err(self.finished());
        }

        match self.ingest(name, reader) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.abort();
                Err(err)
            }
        }
    }

    /// Complete the day
    ///
    /// Returns the day's totals, or `None` if no file was
    /// ever ingested.
    pub fn finish(mut self) -> Result<Option<DaySummary>, IngestError> {
        if self.state.is_terminal() {
            return Err(self.finished());
        }

        let closed = match self.open.as_mut() {
            Some(open) => open.writer.close(),
            None => {
                transition(&mut self.state, PipelineState::Closed, self.day);
                warn!("{}: no data ingested", self.day);
                return Ok(None);
            }
        };
        if let Err(source) = closed {
            self.abort();
            return Err(IngestError::Archive {
                day: self.day,
                source,
            });
        }

        transition(&mut self.state, PipelineState::Closed, self.day);
        let summary = self.open.take().map(|o| o.summary);
        if let Some(summary) = &summary {
            info!("{}", summary);
        }
        Ok(summary)
    }

    /// Abandon the day, discarding all of its output
    pub fn abort(&mut self) {
        if self.state == PipelineState::Aborted {
            return;
        }
        transition(&mut self.state, PipelineState::Aborted, self.day);
        if let Some(mut open) = self.open.take() {
            if let Err(err) = open.writer.discard() {
                warn!("{}: unable to discard output: {}", self.day, err);
            }
        }
    }

    fn finished(&self) -> IngestError {
        IngestError::Finished {
            day: self.day,
            state: self.state,
        }
    }

    fn ingest<R: BufRead>(&mut self, name: &str, mut reader: R) -> Result<(), IngestError> {
        transition(&mut self.state, PipelineState::HeaderPending, self.day);

        let header_location = SourceLocation {
            file: name.to_owned(),
            line: 1,
            block_start: None,
        };
        let (record, first, consumed) = self
            .ingestor
            .parser
            .read_header(&mut reader)
            .map_err(|err| IngestError::from_header(err, header_location.clone()))?;

        let mut file = FileCursor::new(name, consumed, &record);
        let open = OpenDay::accept(
            &mut self.open,
            &mut *self.archive,
            self.ingestor,
            self.day,
            record,
            &header_location,
        )?;
        transition(&mut self.state, PipelineState::Streaming, self.day);

        open.stream(&mut file, first, reader)
    }
}

// Accepted configuration and output of an open day
struct OpenDay<W> {
    accepted: ConfigurationRecord,
    writer: W,
    tracker: ContinuityTracker,
    uuid: Option<String>,
    summary: DaySummary,
}

impl<W: ArchiveWriter> OpenDay<W> {
    // Accept a file's header, opening the day on the first one
    fn accept<'s, A>(
        slot: &'s mut Option<OpenDay<W>>,
        archive: &mut A,
        ingestor: &Ingestor,
        day: NaiveDate,
        record: ConfigurationRecord,
        location: &SourceLocation,
    ) -> Result<&'s mut OpenDay<W>, IngestError>
    where
        A: Archive<Writer = W>,
    {
        match slot {
            Some(open) => {
                ingestor
                    .guard
                    .check(&open.accepted, &record)
                    .map_err(|source| IngestError::ConfigurationDrift {
                        location: location.clone(),
                        source,
                    })?;
                debug!("{}: configuration unchanged", location.file);
                Ok(open)
            }
            None => {
                let rate = record.sample_rate();
                let start = GlobalSampleIndex::day_start(day, rate);
                let properties =
                    ArchiveProperties::new(rate, start).with_uuid(ingestor.uuid.clone());
                let writer = archive
                    .open_day(day, &properties)
                    .map_err(|source| IngestError::Archive { day, source })?;

                info!(
                    "{}: station {} at {} Hz, beacons {}",
                    day,
                    record.station(),
                    rate,
                    record.beacons().join(", ")
                );
                Ok(slot.insert(OpenDay {
                    accepted: record,
                    writer,
                    tracker: ContinuityTracker::new(start, rate, ingestor.seconds_per_file),
                    uuid: ingestor.uuid.clone(),
                    summary: DaySummary::new(day),
                }))
            }
        }
    }

    // Read the rest of a file, after its header
    fn stream<R: BufRead>(
        &mut self,
        file: &mut FileCursor,
        first: Option<String>,
        mut reader: R,
    ) -> Result<(), IngestError> {
        let more = match first {
            Some(line) => self.handle_line(file, &line)?,
            None => false,
        };

        if more {
            let mut buf = String::new();
            loop {
                buf.clear();
                let n = reader
                    .read_line(&mut buf)
                    .map_err(|source| IngestError::Read {
                        location: SourceLocation {
                            file: file.name.clone(),
                            line: file.line + 1,
                            block_start: None,
                        },
                        source,
                    })?;
                if n == 0 {
                    break;
                }

                file.line += 1;
                if !self.handle_line(file, buf.trim_end())? {
                    break;
                }
            }
        }

        self.end_file(file)
    }

    // Handle one line; false at end of stream
    fn handle_line(&mut self, file: &mut FileCursor, line: &str) -> Result<bool, IngestError> {
        match FrameKind::classify(line) {
            FrameKind::Blank => {
                debug!("{}:{}: blank line, end of stream", file.name, file.line);
                return Ok(false);
            }
            FrameKind::Comment => {
                trace!("{}:{}: comment ignored", file.name, file.line);
            }
            FrameKind::Timestamp => {
                let frame = TimestampFrame::new(line).map_err(|source| IngestError::FrameDecode {
                    location: file.here(None),
                    source,
                })?;
                file.expect_closed()?;
                file.open = Some((frame, file.line));
            }
            FrameKind::Checksum => {
                let frame = ChecksumFrame::new(line).map_err(|source| IngestError::FrameDecode {
                    location: file.here(None),
                    source,
                })?;
                match file.open.take() {
                    Some((timestamp, _)) => self.close_block(file, timestamp, frame)?,
                    None => return Err(file.unframed(FrameKind::Checksum)),
                }
            }
            FrameKind::Data => {
                let block_start = file.open.as_ref().map(|(ts, _)| file.index_of(ts));
                file.decoder
                    .push_line(line)
                    .map_err(|source| IngestError::DataDecode {
                        location: file.here(block_start),
                        source,
                    })?;
                if block_start.is_none() {
                    return Err(file.unframed(FrameKind::Data));
                }
            }
        }
        Ok(true)
    }

    // Accept a closed block and write its metadata
    fn close_block(
        &mut self,
        file: &mut FileCursor,
        timestamp: TimestampFrame,
        checksum: ChecksumFrame,
    ) -> Result<(), IngestError> {
        let block = DataBlock::new(timestamp, checksum, file.decoder.take(), file.rate);

        let index = self
            .tracker
            .admit(block.timestamp(), block.len())
            .map_err(|source| IngestError::Ordering {
                location: file.here(Some(file.index_of(block.timestamp()))),
                source,
            })?;

        if file.blocks == 0 && index.epoch_seconds(self.tracker.sample_rate()) % SECONDS_PER_HOUR != 0 {
            warn!(
                "{}: first block {} is not at the start of an hour",
                file.name,
                block.timestamp().time_str()
            );
        }
        if !block.checksum().is_verified() {
            debug!(
                "{}:{}: block {} not verified (flag '{}')",
                file.name,
                file.line,
                block.timestamp().time_str(),
                block.checksum().verify()
            );
        }

        let second = SecondMetadata::from_block(&block);
        let record = if self.summary.blocks == 0 {
            MetadataRecord::DayStart {
                uuid: self.uuid.clone(),
                config: Box::new(self.accepted.clone()),
                second,
            }
        } else {
            MetadataRecord::Second(second)
        };
        let day = self.summary.day;
        self.writer
            .write_metadata(index, &record)
            .map_err(|source| IngestError::Archive { day, source })?;

        self.summary.blocks += 1;
        self.summary.first_index.get_or_insert(index);
        self.summary.last_index = Some(index);
        file.blocks += 1;
        file.samples.extend(block.into_rows());
        Ok(())
    }

    // Write the file's samples
    fn end_file(&mut self, file: &mut FileCursor) -> Result<(), IngestError> {
        file.expect_closed()?;

        let day = self.summary.day;
        let plan = self.tracker.finish_file();
        if plan.is_empty() {
            warn!("{}: no complete blocks", file.name);
        } else {
            let written = match (plan.mode, plan.start()) {
                (WriteMode::Contiguous, Some(start)) => {
                    self.writer.write_samples(start, &file.samples)
                }
                _ => self.writer.write_samples_gapped(&file.samples, &plan.blocks),
            };
            written.map_err(|source| IngestError::Archive { day, source })?;

            match plan.mode {
                WriteMode::Contiguous => self.summary.contiguous_files += 1,
                WriteMode::Gapped => self.summary.gapped_files += 1,
            }
        }

        self.summary.files += 1;
        self.summary.rows += plan.rows;
        info!(
            "{}: {} blocks, {} rows, {}",
            file.name, file.blocks, plan.rows, plan.mode
        );
        Ok(())
    }
}

// Per-file reading state
//
// `samples` grows to the whole file's rows.
struct FileCursor {
    name: String,
    line: usize,
    rate: usize,
    decoder: DataBlockDecoder,
    open: Option<(TimestampFrame, usize)>,
    samples: Vec<SampleRow>,
    blocks: usize,
}

impl FileCursor {
    fn new(name: &str, line: usize, record: &ConfigurationRecord) -> Self {
        let rate = record.sample_rate() as usize;
        Self {
            name: name.to_owned(),
            line,
            rate,
            decoder: DataBlockDecoder::new(*record.zero_cal(), rate),
            open: None,
            samples: Vec::new(),
            blocks: 0,
        }
    }

    fn here(&self, block_start: Option<GlobalSampleIndex>) -> SourceLocation {
        SourceLocation {
            file: self.name.clone(),
            line: self.line,
            block_start,
        }
    }

    fn index_of(&self, timestamp: &TimestampFrame) -> GlobalSampleIndex {
        GlobalSampleIndex::from_epoch(timestamp.epoch_seconds(), self.rate as u32)
    }

    fn unframed(&self, kind: FrameKind) -> IngestError {
        IngestError::FrameDecode {
            location: self.here(None),
            source: FrameDecodeError::Unframed(kind),
        }
    }

    // Fails if a block is still waiting for its checksum
    fn expect_closed(&self) -> Result<(), IngestError> {
        match &self.open {
            Some((timestamp, opened)) => Err(IngestError::FrameDecode {
                location: SourceLocation {
                    file: self.name.clone(),
                    line: *opened,
                    block_start: Some(self.index_of(timestamp)),
                },
                source: FrameDecodeError::MissingChecksum(timestamp.time_str()),
            }),
            None => Ok(()),
        }
    }
}

fn transition(state: &mut PipelineState, next: PipelineState, day: NaiveDate) {
    if *state != next {
        debug!("{}: new state: {}", day, next);
        *state = next;
    }
}

const READ_BUFFER: usize = 1 << 16;
const SECONDS_PER_HOUR: i64 = 3600;
