//! Timestamp control frame

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use super::{FrameDecodeError, FrameKind};

/// GPS lock state reported by the station
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
pub enum GpsLock {
    /// Receiver is disciplined to GPS time
    #[strum(serialize = "L")]
    #[serde(rename = "L")]
    Locked,

    /// Receiver is free-running
    #[strum(serialize = "U")]
    #[serde(rename = "U")]
    Unlocked,
}

/// GPS position fix quality
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
pub enum FixQuality {
    /// No position fix
    #[strum(serialize = "0")]
    NoFix,

    /// Two-dimensional fix
    #[strum(serialize = "2")]
    Fix2D,

    /// Three-dimensional fix
    #[strum(serialize = "3")]
    Fix3D,
}

impl FixQuality {
    /// Numeric fix code, as transmitted
    pub fn code(&self) -> u8 {
        match self {
            FixQuality::NoFix => 0,
            FixQuality::Fix2D => 2,
            FixQuality::Fix3D => 3,
        }
    }
}

/// A decoded timestamp frame
///
/// Each one-second cycle of a station stream opens with a
/// fixed-layout timestamp frame:
///
/// ```txt
/// T20240408000000L3A1
/// │└─────┬──────┘│││└ DOP (hex digit)
/// │      │       ││└─ satellite count (hex digit)
/// │      │       │└── fix quality (0, 2, 3)
/// │      │       └─── GPS lock (L, U)
/// │      └─────────── YYYYMMDDhhmmss, UTC
/// └────────────────── indicator
/// ```
///
/// The embedded date-time is always UTC. The frame is
/// re-encoded exactly by `Display`.
///
/// ```
/// use grapestream::{FixQuality, GpsLock, TimestampFrame};
///
/// let frame = TimestampFrame::new("T20240408000000L3A1").expect("bad frame");
/// assert_eq!(frame.epoch_seconds(), 1712534400);
/// assert_eq!(frame.gps_lock(), GpsLock::Locked);
/// assert_eq!(frame.fix(), FixQuality::Fix3D);
/// assert_eq!(frame.satellites(), 10);
/// assert_eq!(frame.dop(), 1);
/// assert_eq!("T20240408000000L3A1", &format!("{}", frame));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimestampFrame {
    time: DateTime<Utc>,
    gps_lock: GpsLock,
    fix: FixQuality,
    satellites: u8,
    dop: u8,
}

impl TimestampFrame {
    /// Decode a timestamp frame from its line
    ///
    /// The line must hold the complete fixed layout. Extra
    /// trailing characters are ignored.
    pub fn new(line: &str) -> Result<Self, FrameDecodeError> {
        if !line.is_ascii() {
            return Err(FrameDecodeError::NotAscii(FrameKind::Timestamp));
        }
        if line.len() < Self::LENGTH {
            return Err(FrameDecodeError::TooShort {
                kind: FrameKind::Timestamp,
                len: line.len(),
                min: Self::LENGTH,
            });
        }
        if !line.starts_with(Self::INDICATOR) {
            return Err(FrameDecodeError::WrongIndicator(FrameKind::Timestamp));
        }

        let stamp = &line[Self::OFFSET_TIME..Self::OFFSET_TIME + 14];
        let time = NaiveDateTime::parse_from_str(stamp, Self::TIME_FORMAT)
            .map_err(|_| FrameDecodeError::InvalidDateTime(stamp.to_owned()))?
            .and_utc();

        let lock_str = &line[Self::OFFSET_LOCK..Self::OFFSET_LOCK + 1];
        let gps_lock = GpsLock::from_str(lock_str).map_err(|_| invalid("GPS lock", lock_str))?;

        let fix_str = &line[Self::OFFSET_FIX..Self::OFFSET_FIX + 1];
        let fix = FixQuality::from_str(fix_str).map_err(|_| invalid("fix quality", fix_str))?;

        let sat_str = &line[Self::OFFSET_SATS..Self::OFFSET_SATS + 1];
        let satellites =
            u8::from_str_radix(sat_str, 16).map_err(|_| invalid("satellite count", sat_str))?;

        let dop_str = &line[Self::OFFSET_DOP..Self::OFFSET_DOP + 1];
        let dop = u8::from_str_radix(dop_str, 16).map_err(|_| invalid("DOP", dop_str))?;

        Ok(Self {
            time,
            gps_lock,
            fix,
            satellites,
            dop,
        })
    }

    /// Frame time (UTC, one-second resolution)
    pub fn time(&self) -> &DateTime<Utc> {
        &self.time
    }

    /// Frame time as UNIX epoch seconds
    pub fn epoch_seconds(&self) -> i64 {
        self.time.timestamp()
    }

    /// Frame time as transmitted, `YYYYMMDDhhmmss`
    pub fn time_str(&self) -> String {
        self.time.format(Self::TIME_FORMAT).to_string()
    }

    /// GPS lock flag
    pub fn gps_lock(&self) -> GpsLock {
        self.gps_lock
    }

    /// GPS fix quality
    pub fn fix(&self) -> FixQuality {
        self.fix
    }

    /// Number of satellites in view (0–15)
    pub fn satellites(&self) -> u8 {
        self.satellites
    }

    /// Position dilution of precision (0–15)
    pub fn dop(&self) -> u8 {
        self.dop
    }

    /// Fixed length of the frame layout
    pub const LENGTH: usize = 19;

    const INDICATOR: char = 'T';
    const OFFSET_TIME: usize = 1;
    const OFFSET_LOCK: usize = 15;
    const OFFSET_FIX: usize = 16;
    const OFFSET_SATS: usize = 17;
    const OFFSET_DOP: usize = 18;
    const TIME_FORMAT: &'static str = "%Y%m%d%H%M%S";
}

impl fmt::Display for TimestampFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lock: &'static str = self.gps_lock.into();
        let fix: &'static str = self.fix.into();
        write!(
            f,
            "{}{}{}{}{:X}{:X}",
            Self::INDICATOR,
            self.time.format(Self::TIME_FORMAT),
            lock,
            fix,
            self.satellites,
            self.dop
        )
    }
}

impl TryFrom<&str> for TimestampFrame {
    type Error = FrameDecodeError;

    #[inline]
    fn try_from(inp: &str) -> Result<Self, Self::Error> {
        Self::new(inp)
    }
}

fn invalid(field: &'static str, value: &str) -> FrameDecodeError {
    FrameDecodeError::InvalidField {
        field,
        value: value.chars().next().unwrap_or(' '),
    }
}
