//! Archive-wide sample coordinate

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Archive-wide sample coordinate
///
/// A `GlobalSampleIndex` counts samples since the UNIX epoch at
/// the station's sampling rate:
///
/// ```txt
/// index = epoch_seconds * sample_rate
/// ```
///
/// It is the sole ordering key of the archive. Every block of
/// samples and every metadata record is stored at one.
///
/// ```
/// use grapestream::GlobalSampleIndex;
///
/// let idx = GlobalSampleIndex::from_epoch(1712534400, 8000);
/// assert_eq!(idx.value(), 1712534400 * 8000);
/// assert_eq!(idx.offset(8000), GlobalSampleIndex::from_epoch(1712534401, 8000));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GlobalSampleIndex(i64);

impl GlobalSampleIndex {
    /// Wrap a raw index value
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Index of the first sample of the given epoch second
    pub fn from_epoch(epoch_seconds: i64, sample_rate: u32) -> Self {
        Self(epoch_seconds * sample_rate as i64)
    }

    /// Index of the first sample of the given UTC time
    ///
    /// Sub-second precision is discarded.
    pub fn from_datetime(at: &DateTime<Utc>, sample_rate: u32) -> Self {
        Self::from_epoch(at.timestamp(), sample_rate)
    }

    /// Index of the first sample of a civil UTC day
    pub fn day_start(day: NaiveDate, sample_rate: u32) -> Self {
        let midnight = day.and_time(chrono::NaiveTime::MIN).and_utc();
        Self::from_datetime(&midnight, sample_rate)
    }

    /// Raw index value
    pub const fn value(&self) -> i64 {
        self.0
    }

    /// Index `rows` samples later
    pub fn offset(&self, rows: usize) -> Self {
        Self(self.0 + rows as i64)
    }

    /// Signed distance, in samples, from `earlier` to `self`
    pub fn since(&self, earlier: GlobalSampleIndex) -> i64 {
        self.0 - earlier.0
    }

    /// Whole epoch second containing this index
    pub fn epoch_seconds(&self, sample_rate: u32) -> i64 {
        self.0.div_euclid(sample_rate as i64)
    }
}

impl fmt::Display for GlobalSampleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<GlobalSampleIndex> for i64 {
    fn from(idx: GlobalSampleIndex) -> i64 {
        idx.0
    }
}
