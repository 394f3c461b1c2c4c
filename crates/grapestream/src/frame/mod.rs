//! Line framing: classification and control-frame decoding
//!
//! A station file is a sequence of text lines. After a block of
//! header comments, the station repeats a one-second cycle:
//!
//! ```txt
//! T20240408000000L3A1        ← timestamp frame
//! 7EDE,7F07,7F2A             ← one data row per sample tick
//! …                             (sample_rate rows)
//! C1A2B3C4DV                 ← checksum frame
//! ```
//!
//! [`FrameKind::classify()`] labels each line by looking at
//! its first character. The control frames are decoded by
//! [`TimestampFrame`] and [`ChecksumFrame`].

mod checksum;
mod timestamp;

use thiserror::Error;

pub use checksum::ChecksumFrame;
pub use timestamp::{FixQuality, GpsLock, TimestampFrame};

/// Kind of line in a station stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum FrameKind {
    /// Header or free-form comment (`#`)
    Comment,

    /// Timestamp control frame (`T`)
    Timestamp,

    /// Checksum control frame (`C`)
    Checksum,

    /// Data row of comma-separated hexadecimal samples
    Data,

    /// Empty line, which ends the stream
    Blank,
}

impl FrameKind {
    /// Classify one line
    ///
    /// The `line` should already be stripped of trailing
    /// whitespace. Classification looks only at the start of
    /// the line and never at its neighbors.
    ///
    /// `C` is both the checksum indicator and a hexadecimal
    /// digit. A data row whose first sample begins with `C`
    /// has a comma within its first few characters, which a
    /// checksum frame never has.
    ///
    /// Anything unrecognized is reported as `Data` and left
    /// for the data decoder to reject.
    ///
    /// ```
    /// use grapestream::FrameKind;
    ///
    /// assert_eq!(FrameKind::Comment, FrameKind::classify("# RFGain  10"));
    /// assert_eq!(FrameKind::Timestamp, FrameKind::classify("T20240408000000L3A1"));
    /// assert_eq!(FrameKind::Checksum, FrameKind::classify("C1A2B3C4DV"));
    /// assert_eq!(FrameKind::Data, FrameKind::classify("7EDE,7F07,7F2A"));
    /// assert_eq!(FrameKind::Data, FrameKind::classify("C001,7F07,7F2A"));
    /// assert_eq!(FrameKind::Blank, FrameKind::classify(""));
    /// ```
    pub fn classify(line: &str) -> Self {
        let bytes = line.as_bytes();
        match bytes.first() {
            None => FrameKind::Blank,
            Some(b'#') => FrameKind::Comment,
            Some(b'T') => FrameKind::Timestamp,
            Some(b'C') if !has_early_comma(bytes) => FrameKind::Checksum,
            Some(_) => FrameKind::Data,
        }
    }

    /// True if the line belongs to the one-second data cycle
    pub fn is_control(&self) -> bool {
        matches!(self, FrameKind::Timestamp | FrameKind::Checksum)
    }
}

/// Error decoding a control frame
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameDecodeError {
    /// Line is shorter than the fixed frame layout
    #[error("invalid {kind} frame: {len} characters, at least {min} required")]
    TooShort {
        /// Kind of frame being decoded
        kind: FrameKind,
        /// Length of the offending line
        len: usize,
        /// Minimum length of the layout
        min: usize,
    },

    /// Frame contains non-ASCII characters
    #[error("invalid {0} frame: line contains non-ASCII characters")]
    NotAscii(FrameKind),

    /// Line does not begin with the expected indicator
    #[error("invalid {0} frame: wrong indicator character")]
    WrongIndicator(FrameKind),

    /// Embedded date-time is not a valid calendar time
    #[error("invalid timestamp frame: bad date-time \"{0}\"")]
    InvalidDateTime(String),

    /// A single-character field has an unrecognized value
    #[error("invalid timestamp frame: bad {field} \"{value}\"")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending character
        value: char,
    },

    /// A data row or checksum arrived with no timestamp in effect
    #[error("invalid {0} frame: no timestamp frame opens this block")]
    Unframed(FrameKind),

    /// A block opened by the given timestamp was never closed
    /// by a checksum frame
    #[error("invalid block {0}: no checksum frame closes this block")]
    MissingChecksum(String),
}

// Number of leading bytes scanned for a comma
const COMMA_SCAN_LEN: usize = 6;

fn has_early_comma(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .take(COMMA_SCAN_LEN)
        .any(|&b| b == b',')
}
