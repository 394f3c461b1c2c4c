//! Calibrated sample blocks

use thiserror::Error;

use crate::frame::{ChecksumFrame, TimestampFrame};
use crate::header::CHANNELS;

/// One calibrated sample per channel
pub type SampleRow = [i32; CHANNELS];

/// Error decoding a data row
#[derive(Error, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataDecodeError {
    /// Row does not have exactly one field per channel
    #[error("invalid data row: {0} fields, expected 3")]
    FieldCount(usize),

    /// A field is not a 16-bit hexadecimal word
    #[error("invalid data row: field {channel} is not a 16-bit hex word: \"{text}\"")]
    NotHex {
        /// Zero-based channel of the field
        channel: usize,
        /// Offending text
        text: String,
    },
}

/// Decode and calibrate one data row
///
/// The `line` holds three comma-separated hexadecimal words.
/// Each word is widened and added to its channel's
/// `zero_cal` offset.
///
/// ```
/// use grapestream::decode_row;
///
/// let row = decode_row("8000,7F07,0000", &[-290, -249, -214]).expect("bad row");
/// assert_eq!(row, [0x8000 - 290, 0x7f07 - 249, -214]);
/// ```
pub fn decode_row(line: &str, zero_cal: &[i32; CHANNELS]) -> Result<SampleRow, DataDecodeError> {
    let mut out = [0i32; CHANNELS];
    let mut count = 0usize;
    for (channel, field) in line.split(',').enumerate() {
        count += 1;
        if channel >= CHANNELS {
            continue;
        }

        let field = field.trim();
        let raw = u16::from_str_radix(field, 16).map_err(|_| DataDecodeError::NotHex {
            channel,
            text: field.to_owned(),
        })?;
        out[channel] = raw as i32 + zero_cal[channel];
    }

    if count != CHANNELS {
        return Err(DataDecodeError::FieldCount(count));
    }
    Ok(out)
}

/// Accumulates the data rows of one block
///
/// Rows are decoded as they arrive. The first bad row is a
/// hard error for the whole block; nothing is salvaged.
#[derive(Clone, Debug)]
pub struct DataBlockDecoder {
    zero_cal: [i32; CHANNELS],
    expected_rows: usize,
    rows: Vec<SampleRow>,
}

impl DataBlockDecoder {
    /// New decoder for the given calibration and nominal size
    pub fn new(zero_cal: [i32; CHANNELS], expected_rows: usize) -> Self {
        Self {
            zero_cal,
            expected_rows,
            rows: Vec::with_capacity(expected_rows),
        }
    }

    /// Decode and append one data row
    pub fn push_line(&mut self, line: &str) -> Result<(), DataDecodeError> {
        let row = decode_row(line, &self.zero_cal)?;
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows accumulated so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no rows have been accumulated
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Nominal number of rows per block
    pub fn expected_rows(&self) -> usize {
        self.expected_rows
    }

    /// Take the accumulated rows, leaving the decoder empty
    pub fn take(&mut self) -> Vec<SampleRow> {
        std::mem::replace(&mut self.rows, Vec::with_capacity(self.expected_rows))
    }

    /// Discard accumulated rows
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// A closed one-second block of calibrated samples
///
/// Framed by a [`TimestampFrame`] and the [`ChecksumFrame`]
/// which closed it.
#[derive(Clone, Debug, PartialEq)]
pub struct DataBlock {
    timestamp: TimestampFrame,
    checksum: ChecksumFrame,
    rows: Vec<SampleRow>,
    expected_rows: usize,
}

impl DataBlock {
    /// Assemble a block
    pub fn new(
        timestamp: TimestampFrame,
        checksum: ChecksumFrame,
        rows: Vec<SampleRow>,
        expected_rows: usize,
    ) -> Self {
        Self {
            timestamp,
            checksum,
            rows,
            expected_rows,
        }
    }

    /// Timestamp frame which opened the block
    pub fn timestamp(&self) -> &TimestampFrame {
        &self.timestamp
    }

    /// Checksum frame which closed the block
    pub fn checksum(&self) -> &ChecksumFrame {
        &self.checksum
    }

    /// Calibrated samples, one row per sample tick
    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    /// Consume the block, returning its samples
    pub fn into_rows(self) -> Vec<SampleRow> {
        self.rows
    }

    /// Number of sample rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True if the block has exactly its nominal row count
    pub fn is_complete(&self) -> bool {
        self.rows.len() == self.expected_rows
    }
}
