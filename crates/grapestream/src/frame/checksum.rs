//! Checksum control frame

use std::convert::TryFrom;
use std::fmt;

use super::{FrameDecodeError, FrameKind};

/// A decoded checksum frame
///
/// Each one-second cycle closes with a checksum frame: the
/// `C` indicator, the station's checksum over the block, and
/// a single verification flag character.
///
/// ```
/// use grapestream::ChecksumFrame;
///
/// let frame = ChecksumFrame::new("C1A2B3C4DV").expect("bad frame");
/// assert_eq!(frame.checksum(), "1A2B3C4D");
/// assert_eq!(frame.verify(), 'V');
/// assert!(frame.is_verified());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChecksumFrame {
    // checksum payload, without indicator or flag
    checksum: String,
    verify: char,
}

impl ChecksumFrame {
    /// Decode a checksum frame from its line
    pub fn new(line: &str) -> Result<Self, FrameDecodeError> {
        if !line.is_ascii() {
            return Err(FrameDecodeError::NotAscii(FrameKind::Checksum));
        }
        if line.len() < Self::MIN_LENGTH {
            return Err(FrameDecodeError::TooShort {
                kind: FrameKind::Checksum,
                len: line.len(),
                min: Self::MIN_LENGTH,
            });
        }
        if !line.starts_with(Self::INDICATOR) {
            return Err(FrameDecodeError::WrongIndicator(FrameKind::Checksum));
        }

        let end = line.len() - 1;
        Ok(Self {
            checksum: line[1..end].to_owned(),
            verify: line.as_bytes()[end] as char,
        })
    }

    /// Checksum payload
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Verification flag character
    pub fn verify(&self) -> char {
        self.verify
    }

    /// True if the station verified the block
    pub fn is_verified(&self) -> bool {
        self.verify == Self::VERIFIED
    }

    /// Minimum line length: indicator, one payload character, flag
    pub const MIN_LENGTH: usize = 3;

    const INDICATOR: char = 'C';
    const VERIFIED: char = 'V';
}

impl fmt::Display for ChecksumFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", Self::INDICATOR, self.checksum, self.verify)
    }
}

impl TryFrom<&str> for ChecksumFrame {
    type Error = FrameDecodeError;

    #[inline]
    fn try_from(inp: &str) -> Result<Self, Self::Error> {
        Self::new(inp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let frame = ChecksumFrame::new("C1234567890").expect("bad frame");
        assert_eq!(frame.checksum(), "123456789");
        assert_eq!(frame.verify(), '0');
        assert!(!frame.is_verified());
        assert_eq!("C1234567890", &format!("{}", frame));

        let frame = ChecksumFrame::try_from("CXV").expect("bad frame");
        assert_eq!(frame.checksum(), "X");
        assert!(frame.is_verified());
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            Err(FrameDecodeError::TooShort {
                kind: FrameKind::Checksum,
                len: 2,
                min: 3
            }),
            ChecksumFrame::new("CV")
        );
        assert!(ChecksumFrame::new("C").is_err());
        assert_eq!(
            Err(FrameDecodeError::WrongIndicator(FrameKind::Checksum)),
            ChecksumFrame::new("T1234V")
        );
    }
}
