//! Global sample indexing and gap detection
//!
//! Each closed block is placed in the archive at the
//! [`GlobalSampleIndex`] of its timestamp. Within one day,
//! block indices must strictly increase. A block whose size
//! differs from the sample rate only makes its file gapped; an
//! oversized block running into its successor is refused by the
//! archive writer.
//!
//! Continuity is judged one input file at a time. A file is
//! *contiguous* when
//!
//! 1. it holds exactly `seconds_per_file` blocks;
//! 2. every block holds exactly `sample_rate` rows; and
//! 3. every block begins exactly one second after the last.
//!
//! A contiguous file is written to the archive as a single run
//! of samples. Anything else is *gapped*, and each block is
//! written at its own index.

#[cfg(not(test))]
use log::{debug, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as warn;

use thiserror::Error;

use crate::frame::TimestampFrame;
use crate::index::GlobalSampleIndex;

/// Nominal seconds of data per station file
pub const SECONDS_PER_FILE: usize = 3600;

/// A block which is out of order
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrderingError {
    /// Block precedes the start of the processing day
    #[error("block at sample {current} precedes the day start at sample {day_start}")]
    BeforeDayStart {
        /// Day start index
        day_start: GlobalSampleIndex,
        /// Offending block index
        current: GlobalSampleIndex,
    },

    /// Block index does not advance past its predecessor
    #[error("block at sample {current} does not follow previous block at sample {previous}")]
    NotIncreasing {
        /// Previous block index
        previous: GlobalSampleIndex,
        /// Offending block index
        current: GlobalSampleIndex,
    },
}

/// How a file's samples are handed to the archive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum WriteMode {
    /// One bulk write of every row
    #[strum(serialize = "contiguous")]
    Contiguous,

    /// Each block written at its own index
    #[strum(serialize = "gapped")]
    Gapped,
}

/// Placement of one block within a gapped write
///
/// The block's first row is `row` within the concatenated
/// sample matrix, and it is stored at `index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockOffset {
    /// Archive index of the block's first row
    pub index: GlobalSampleIndex,

    /// Offset of the block's first row in the sample matrix
    pub row: usize,
}

/// Write plan for one input file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePlan {
    /// Contiguous or gapped
    pub mode: WriteMode,

    /// Placement of every block, in order
    pub blocks: Vec<BlockOffset>,

    /// Total rows across all blocks
    pub rows: usize,
}

impl FilePlan {
    /// Index of the first block, if any
    pub fn start(&self) -> Option<GlobalSampleIndex> {
        self.blocks.first().map(|b| b.index)
    }

    /// True if the file contributed no samples
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// Tracks block indices across one processing day
///
/// ```
/// use grapestream::{ContinuityTracker, GlobalSampleIndex, TimestampFrame, WriteMode};
///
/// let start = GlobalSampleIndex::from_epoch(1712534400, 4);
/// let mut tracker = ContinuityTracker::new(start, 4, 2);
///
/// let t0 = TimestampFrame::new("T20240408000000L3A1").unwrap();
/// let t1 = TimestampFrame::new("T20240408000001L3A1").unwrap();
/// assert_eq!(tracker.admit(&t0, 4), Ok(start));
/// assert_eq!(tracker.admit(&t1, 4), Ok(start.offset(4)));
///
/// let plan = tracker.finish_file();
/// assert_eq!(plan.mode, WriteMode::Contiguous);
/// assert_eq!(plan.rows, 8);
/// ```
#[derive(Clone, Debug)]
pub struct ContinuityTracker {
    sample_rate: u32,
    day_start: GlobalSampleIndex,
    seconds_per_file: usize,

    // previous admitted block: (index, rows)
    last: Option<GlobalSampleIndex>,

    // current file
    blocks: Vec<BlockOffset>,
    rows: usize,
    contiguous: bool,
}

impl ContinuityTracker {
    /// New tracker for a day
    ///
    /// `day_start` is the index of the day's first sample.
    /// Files are expected to hold `seconds_per_file` seconds.
    pub fn new(day_start: GlobalSampleIndex, sample_rate: u32, seconds_per_file: usize) -> Self {
        Self {
            sample_rate,
            day_start,
            seconds_per_file,
            last: None,
            blocks: Vec::with_capacity(seconds_per_file),
            rows: 0,
            contiguous: true,
        }
    }

    /// Sampling rate of the day
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Index of the day's first sample
    pub fn day_start(&self) -> GlobalSampleIndex {
        self.day_start
    }

    /// Index of the last admitted block, if any
    pub fn last_index(&self) -> Option<GlobalSampleIndex> {
        self.last
    }

    /// Archive index for a timestamp
    pub fn index_of(&self, timestamp: &TimestampFrame) -> GlobalSampleIndex {
        GlobalSampleIndex::from_epoch(timestamp.epoch_seconds(), self.sample_rate)
    }

    /// Admit a closed block of `rows` rows
    ///
    /// Returns the block's archive index, or an error if the
    /// block is out of order. Rejected blocks leave the
    /// tracker unchanged.
    pub fn admit(
        &mut self,
        timestamp: &TimestampFrame,
        rows: usize,
    ) -> Result<GlobalSampleIndex, OrderingError> {
        let index = self.index_of(timestamp);
        self.check_order(index)?;

        if rows != self.sample_rate as usize {
            warn!(
                "block at {} ({}): {} rows, expected {}",
                index,
                timestamp.time_str(),
                rows,
                self.sample_rate
            );
            self.contiguous = false;
        }

        if let Some(prev) = self.blocks.last() {
            if index.since(prev.index) != self.sample_rate as i64 {
                debug!(
                    "gap: block at {} follows block at {}",
                    index, prev.index
                );
                self.contiguous = false;
            }
        }

        self.blocks.push(BlockOffset {
            index,
            row: self.rows,
        });
        self.rows += rows;
        self.last = Some(index);
        Ok(index)
    }

    /// Close out the current file
    ///
    /// Returns the write plan for the file's blocks and
    /// resets per-file state. Day-wide ordering state is kept.
    pub fn finish_file(&mut self) -> FilePlan {
        let complete = self.blocks.len() == self.seconds_per_file;
        if !complete {
            debug!(
                "file holds {} blocks, expected {}",
                self.blocks.len(),
                self.seconds_per_file
            );
        }

        let mode = if complete && self.contiguous {
            WriteMode::Contiguous
        } else {
            WriteMode::Gapped
        };

        let plan = FilePlan {
            mode,
            blocks: std::mem::replace(&mut self.blocks, Vec::with_capacity(self.seconds_per_file)),
            rows: self.rows,
        };
        self.rows = 0;
        self.contiguous = true;
        plan
    }

    fn check_order(&self, index: GlobalSampleIndex) -> Result<(), OrderingError> {
        if index < self.day_start {
            return Err(OrderingError::BeforeDayStart {
                day_start: self.day_start,
                current: index,
            });
        }

        match self.last {
            Some(previous) if index <= previous => Err(OrderingError::NotIncreasing {
                previous,
                current: index,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testdata::DAY_START_EPOCH;

    const RATE: u32 = 10;

    fn stamp(sec: i64) -> TimestampFrame {
        let time = chrono::DateTime::from_timestamp(sec, 0).unwrap();
        TimestampFrame::new(&format!("T{}L3A1", time.format("%Y%m%d%H%M%S"))).unwrap()
    }

    fn tracker(seconds_per_file: usize) -> ContinuityTracker {
        ContinuityTracker::new(
            GlobalSampleIndex::from_epoch(DAY_START_EPOCH, RATE),
            RATE,
            seconds_per_file,
        )
    }

    #[test]
    fn test_full_hour_is_contiguous() {
        let mut trk = tracker(SECONDS_PER_FILE);
        for s in 0..SECONDS_PER_FILE as i64 {
            let idx = trk.admit(&stamp(DAY_START_EPOCH + s), RATE as usize).unwrap();
            assert_eq!(idx.value(), (DAY_START_EPOCH + s) * RATE as i64);
        }

        let plan = trk.finish_file();
        assert_eq!(plan.mode, WriteMode::Contiguous);
        assert_eq!(plan.rows, RATE as usize * SECONDS_PER_FILE);
        assert_eq!(plan.blocks.len(), SECONDS_PER_FILE);
        assert_eq!(plan.start(), Some(trk.day_start()));
        assert_eq!(plan.blocks[1].row, RATE as usize);
    }

    #[test]
    fn test_missing_second_is_gapped() {
        let mut trk = tracker(SECONDS_PER_FILE);
        for s in 0..SECONDS_PER_FILE as i64 {
            if s == 1234 {
                continue;
            }
            trk.admit(&stamp(DAY_START_EPOCH + s), RATE as usize).unwrap();
        }

        let plan = trk.finish_file();
        assert_eq!(plan.mode, WriteMode::Gapped);
        assert_eq!(plan.blocks.len(), SECONDS_PER_FILE - 1);
        assert_eq!(
            plan.blocks[1234].index,
            GlobalSampleIndex::from_epoch(DAY_START_EPOCH + 1235, RATE)
        );
        assert_eq!(plan.blocks[1234].row, 1234 * RATE as usize);
    }

    #[test]
    fn test_short_file_is_gapped() {
        // every second present, but the file ends early
        let mut trk = tracker(4);
        for s in 0..3 {
            trk.admit(&stamp(DAY_START_EPOCH + s), RATE as usize).unwrap();
        }
        assert_eq!(trk.finish_file().mode, WriteMode::Gapped);
    }

    #[test]
    fn test_short_block_is_gapped() {
        let mut trk = tracker(3);
        trk.admit(&stamp(DAY_START_EPOCH), RATE as usize).unwrap();
        trk.admit(&stamp(DAY_START_EPOCH + 1), RATE as usize - 1).unwrap();
        trk.admit(&stamp(DAY_START_EPOCH + 2), RATE as usize).unwrap();
        let plan = trk.finish_file();
        assert_eq!(plan.mode, WriteMode::Gapped);
        assert_eq!(plan.rows, 3 * RATE as usize - 1);
        assert_eq!(plan.blocks[2].row, 2 * RATE as usize - 1);
    }

    #[test]
    fn test_contiguity_is_per_file() {
        let mut trk = tracker(2);
        trk.admit(&stamp(DAY_START_EPOCH), RATE as usize).unwrap();
        assert_eq!(trk.finish_file().mode, WriteMode::Gapped);

        // a later file is judged on its own
        trk.admit(&stamp(DAY_START_EPOCH + 3600), RATE as usize).unwrap();
        trk.admit(&stamp(DAY_START_EPOCH + 3601), RATE as usize).unwrap();
        let plan = trk.finish_file();
        assert_eq!(plan.mode, WriteMode::Contiguous);
        assert_eq!(plan.blocks[0].row, 0);

        let empty = trk.finish_file();
        assert!(empty.is_empty());
        assert_eq!(empty.mode, WriteMode::Gapped);
        assert_eq!(empty.start(), None);
    }

    #[test]
    fn test_ordering() {
        let mut trk = tracker(SECONDS_PER_FILE);
        let day_start = trk.day_start();

        assert_eq!(
            Err(OrderingError::BeforeDayStart {
                day_start,
                current: GlobalSampleIndex::from_epoch(DAY_START_EPOCH - 1, RATE)
            }),
            trk.admit(&stamp(DAY_START_EPOCH - 1), RATE as usize)
        );
        assert_eq!(trk.last_index(), None);

        trk.admit(&stamp(DAY_START_EPOCH + 5), RATE as usize).unwrap();
        assert_eq!(
            Err(OrderingError::NotIncreasing {
                previous: GlobalSampleIndex::from_epoch(DAY_START_EPOCH + 5, RATE),
                current: GlobalSampleIndex::from_epoch(DAY_START_EPOCH + 5, RATE),
            }),
            trk.admit(&stamp(DAY_START_EPOCH + 5), RATE as usize)
        );
        assert!(matches!(
            trk.admit(&stamp(DAY_START_EPOCH + 4), RATE as usize),
            Err(OrderingError::NotIncreasing { .. })
        ));

        // an oversized block is admitted, and the next second after it
        trk.admit(&stamp(DAY_START_EPOCH + 6), RATE as usize + 3).unwrap();
        assert_eq!(
            Ok(GlobalSampleIndex::from_epoch(DAY_START_EPOCH + 7, RATE)),
            trk.admit(&stamp(DAY_START_EPOCH + 7), RATE as usize)
        );
        let plan = trk.finish_file();
        assert_eq!(plan.mode, WriteMode::Gapped);
        assert_eq!(plan.rows, 3 * RATE as usize + 3);

        // ordering state survives the end of a file
        assert!(trk.admit(&stamp(DAY_START_EPOCH + 6), RATE as usize).is_err());
        assert!(trk.admit(&stamp(DAY_START_EPOCH + 8), RATE as usize).is_ok());
    }
}
