//! Station header comments → `ConfigurationRecord`
//!
//! Every station file opens with a block of comments. The first
//! is a structured CSV line; the rest are human-readable
//! `key  value` pairs separated by two or more spaces:
//!
//! ```txt
//! #,2024-04-08T00:00:00Z,N0001002,FN42el,42.498340,-71.590725,128.6,Harvard MA,Grape 2
//! ######################################################
//! # MetaData for Grape Gen 2 Station
//! #
//! # Station Node Number      N0001002
//! # Callsign                 AB1XB
//! # Lat, Lon, Elv            42.498340,-71.590725,128.6
//! # GPS Fix,PDOP             3,1.9
//! # RFGain                   10
//! # Antenna                  MLA-30+ active wideband loop
//! # RFDeckSN, LogicCtrlrSN   102,1002
//! #
//! # Beacon 1 Now Decoded     WWV5
//! # Beacon 2 Now Decoded     WWV10
//! # Beacon 3 Now Decoded     WWV15
//! #
//! # A/D Sample Rate          8000
//! # A/D Zero Cal Data        7ede,7f07,7f2a
//! ######################################################
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::io::BufRead;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::beacon::{BeaconTable, UnknownBeaconError};
use crate::frame::FrameKind;

/// Number of channels (and beacon slots) per station
pub const CHANNELS: usize = 3;

/// Error decoding the header comment block
#[derive(Error, Clone, Debug, PartialEq)]
pub enum HeaderDecodeError {
    /// The file does not begin with a header comment
    #[error("invalid header: no leading comment block")]
    Missing,

    /// The structured first line has the wrong number of fields
    #[error("invalid header: first line has {0} fields, expected 8")]
    FieldCount(usize),

    /// The structured first line has a bad timestamp
    #[error("invalid header: bad timestamp \"{0}\"")]
    InvalidTimestamp(String),

    /// A numeric field could not be parsed
    #[error("invalid header: {field} is not a number: \"{value}\"")]
    InvalidNumber {
        /// Field name
        field: &'static str,
        /// Offending text
        value: String,
    },

    /// A required key/value field is absent
    #[error("invalid header: required field \"{0}\" is missing")]
    MissingField(&'static str),

    /// A required key/value field has an unusable value
    #[error("invalid header: field \"{field}\" has invalid value \"{value}\"")]
    InvalidField {
        /// Field name
        field: String,
        /// Offending value
        value: String,
    },

    /// A composite field could not be split into its parts
    #[error("invalid header: composite field \"{0}\" does not have two values")]
    Composite(String),

    /// The number of beacon slots is wrong
    #[error("invalid header: {0} beacon slots, expected 3")]
    BeaconSlots(usize),
}

/// Any failure to parse a header
#[derive(Error, Clone, Debug, PartialEq)]
pub enum HeaderError {
    /// Malformed header
    #[error(transparent)]
    Decode(#[from] HeaderDecodeError),

    /// Beacon name missing from the frequency table
    #[error(transparent)]
    UnknownBeacon(#[from] UnknownBeaconError),
}

/// A preserved header value
///
/// Values which look like numbers are stored as numbers.
/// Comma-separated values become lists.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Whole number
    Integer(i64),

    /// Decimal number
    Float(f64),

    /// Free text
    Text(String),

    /// Comma-separated list, in order
    List(Vec<String>),
}

impl FieldValue {
    /// Convert a header value string
    ///
    /// ```
    /// use grapestream::FieldValue;
    ///
    /// assert_eq!(FieldValue::Integer(8000), FieldValue::parse("8000"));
    /// assert_eq!(FieldValue::Float(1.9), FieldValue::parse("1.9"));
    /// assert_eq!(
    ///     FieldValue::List(vec!["7ede".into(), "7f07".into()]),
    ///     FieldValue::parse("7ede, 7f07")
    /// );
    /// assert_eq!(FieldValue::Text("Harvard MA".into()), FieldValue::parse("Harvard MA"));
    /// ```
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.contains(',') && value.chars().all(is_list_char) {
            FieldValue::List(value.split(',').map(|v| v.trim().to_owned()).collect())
        } else {
            scalar(value)
        }
    }

    /// Text form of a scalar, if this is one
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::List(_) => None,
        }
    }

    /// The list, if this is one
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => i.fmt(f),
            FieldValue::Float(v) => v.fmt(f),
            FieldValue::Text(s) => s.fmt(f),
            FieldValue::List(l) => l.join(",").fmt(f),
        }
    }
}

/// Geographic position of a station
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    /// Latitude, degrees north
    #[serde(rename = "lat")]
    pub latitude: f64,

    /// Longitude, degrees east
    #[serde(rename = "long")]
    pub longitude: f64,

    /// Elevation, meters
    #[serde(rename = "elev")]
    pub elevation: f64,
}

/// Normalized station configuration
///
/// Parsed from the header comments of one station file by the
/// [`HeaderMetadataParser`].
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigurationRecord {
    created: DateTime<Utc>,
    station: String,
    grid_square: String,
    position: Position,
    site: String,
    radio: String,
    beacons: Vec<String>,
    center_frequencies: Vec<f64>,
    sample_rate: u32,
    zero_cal: [i32; CHANNELS],
    fields: BTreeMap<String, FieldValue>,
}

impl ConfigurationRecord {
    /// Time the station wrote the header
    pub fn created(&self) -> &DateTime<Utc> {
        &self.created
    }

    /// Station identifier (node number)
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Maidenhead grid locator
    pub fn grid_square(&self) -> &str {
        &self.grid_square
    }

    /// Station position
    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Free-text site description
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Equipment label
    pub fn radio(&self) -> &str {
        &self.radio
    }

    /// Beacon names, in slot order
    pub fn beacons(&self) -> &[String] {
        &self.beacons
    }

    /// Beacon center frequencies (Hz), in slot order
    pub fn center_frequencies(&self) -> &[f64] {
        &self.center_frequencies
    }

    /// A/D sampling rate, Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Per-channel zero-calibration offsets
    ///
    /// Added to each raw unsigned sample to remove DC bias.
    pub fn zero_cal(&self) -> &[i32; CHANNELS] {
        &self.zero_cal
    }

    /// Remaining key/value fields, by canonical key
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// A remaining key/value field
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Flatten to archive metadata fields
    ///
    /// Produces the full set of key/value pairs which describe
    /// this configuration.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::{json, Value};

        let mut out = serde_json::Map::new();
        for (k, v) in &self.fields {
            out.insert(k.clone(), json!(v));
        }
        out.insert("timestamp".into(), json!(self.created.to_rfc3339()));
        out.insert("station_node_number".into(), json!(self.station));
        out.insert("grid_square".into(), json!(self.grid_square));
        out.insert("lat".into(), json!(self.position.latitude));
        out.insert("long".into(), json!(self.position.longitude));
        out.insert("elev".into(), json!(self.position.elevation));
        out.insert("city_state".into(), json!(self.site));
        out.insert("radio".into(), json!(self.radio));
        for (slot, name) in self.beacons.iter().enumerate() {
            out.insert(format!("beacon_{}_now_decoded", slot + 1), json!(name));
        }
        out.insert("beacons".into(), json!(self.beacons));
        out.insert("center_frequencies".into(), json!(self.center_frequencies));
        out.insert(KEY_SAMPLE_RATE.into(), Value::from(self.sample_rate));
        out.insert(KEY_ZERO_CAL.into(), json!(self.zero_cal));
        out
    }
}

/// Parses station header comments
///
/// The parser is built around an immutable
/// [`BeaconTable`](crate::BeaconTable), which it uses to derive
/// each beacon's center frequency.
///
/// ```
/// use grapestream::{BeaconTable, HeaderMetadataParser};
///
/// let header = [
///     "#,2024-04-08T00:00:00Z,N0001002,FN42el,42.498340,-71.590725,128.6,Harvard MA,Grape 2",
///     "# RFGain                   10",
///     "# Beacon 1 Now Decoded     WWV5",
///     "# Beacon 2 Now Decoded     WWV10",
///     "# Beacon 3 Now Decoded     WWV15",
///     "# A/D Sample Rate          8000",
///     "# A/D Zero Cal Data        7ede,7f07,7f2a",
/// ];
///
/// let parser = HeaderMetadataParser::new(BeaconTable::default());
/// let record = parser.parse(header).expect("bad header");
/// assert_eq!(record.station(), "N0001002");
/// assert_eq!(record.sample_rate(), 8000);
/// assert_eq!(record.center_frequencies(), &[5.0e6, 10.0e6, 15.0e6]);
/// assert_eq!(record.zero_cal(), &[0x7ede - 0x8000, 0x7f07 - 0x8000, 0x7f2a - 0x8000]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct HeaderMetadataParser {
    beacons: BeaconTable,
}

impl HeaderMetadataParser {
    /// Create a parser around a beacon table
    pub fn new(beacons: BeaconTable) -> Self {
        Self { beacons }
    }

    /// Beacon table used by this parser
    pub fn beacon_table(&self) -> &BeaconTable {
        &self.beacons
    }

    /// Parse the header comment lines
    ///
    /// `lines` are the comment lines which precede the first
    /// non-comment line, in order, including their leading `#`.
    pub fn parse<I, S>(&self, lines: I) -> Result<ConfigurationRecord, HeaderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.parse_numbered(lines).map_err(|(err, _)| err)
    }

    // Parse, reporting the 1-based header line of any error
    //
    // Errors which no single line is responsible for, such as a
    // missing field, are reported at the last header line.
    fn parse_numbered<I, S>(&self, lines: I) -> Result<ConfigurationRecord, (HeaderError, usize)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut lines = lines.into_iter();
        let first = lines
            .next()
            .ok_or((HeaderError::from(HeaderDecodeError::Missing), 1usize))?;
        let summary =
            parse_summary(first.as_ref()).map_err(|e| (HeaderError::from(e), 1usize))?;

        // key/value fields, with the line each came from
        let mut fields = BTreeMap::new();
        let mut origins = Vec::new();
        let mut last = 1;
        for (n, line) in lines.enumerate() {
            last = n + 2;
            if let Some((key, value)) = parse_key_value(line.as_ref()) {
                origins.push(FieldOrigin {
                    key: key.clone(),
                    line: last,
                    value: value.clone(),
                });
                fields.insert(key, value);
            }
        }
        let locate = |err: HeaderError| {
            let line = error_line(&err, &origins).unwrap_or(last);
            (err, line)
        };

        resolve_composites(&mut fields).map_err(|e| locate(e.into()))?;

        // beacons, in slot order
        let beacons = take_beacons(&mut fields).map_err(|e| locate(e.into()))?;
        let center_frequencies = self
            .beacons
            .frequencies(beacons.iter().map(|b| b.as_str()))
            .map_err(|e| locate(e.into()))?;

        let sample_rate = take_sample_rate(&mut fields).map_err(|e| locate(e.into()))?;
        let zero_cal = take_zero_cal(&mut fields).map_err(|e| locate(e.into()))?;

        Ok(ConfigurationRecord {
            created: summary.created,
            station: summary.station,
            grid_square: summary.grid_square,
            position: summary.position,
            site: summary.site,
            radio: summary.radio,
            beacons,
            center_frequencies,
            sample_rate,
            zero_cal,
            fields,
        })
    }

    /// Read and parse the header from a stream
    ///
    /// Consumes leading comment lines from `reader`. Returns
    /// the parsed record, the first non-comment line (with
    /// trailing whitespace removed; `None` at end of stream),
    /// and the number of lines consumed.
    pub fn read_header<R>(
        &self,
        reader: &mut R,
    ) -> Result<(ConfigurationRecord, Option<String>, usize), HeaderReadError>
    where
        R: BufRead,
    {
        let mut comments = Vec::new();
        let mut consumed = 0usize;
        let mut next = None;

        let mut buf = String::new();
        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            consumed += 1;

            let line = buf.trim_end();
            if FrameKind::classify(line) == FrameKind::Comment {
                comments.push(line.to_owned());
            } else {
                next = Some(line.to_owned());
                break;
            }
        }

        let record = self
            .parse_numbered(comments)
            .map_err(|(source, line)| HeaderReadError::Header { source, line })?;
        Ok((record, next, consumed))
    }
}

/// Failure to read a header from a stream
#[derive(Error, Debug)]
pub enum HeaderReadError {
    /// Header text could not be parsed
    #[error("{source}")]
    Header {
        /// Cause
        source: HeaderError,
        /// Header line at fault, starting from 1
        line: usize,
    },

    /// Stream could not be read
    #[error("unable to read header: {0}")]
    Io(#[from] std::io::Error),
}

/// Canonical identifier form of a header key
///
/// Lowercase, slashes removed, and each run of other
/// punctuation or whitespace folded to a single `_`.
///
/// ```
/// use grapestream::canonical_key;
///
/// assert_eq!("ad_sample_rate", canonical_key("A/D Sample Rate"));
/// assert_eq!("lat_lon_elv", canonical_key("Lat, Lon, Elv"));
/// assert_eq!("gps_fix_pdop", canonical_key("GPS Fix,PDOP"));
/// ```
pub fn canonical_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;
    for c in key.chars().filter(|&c| c != '/') {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

// structured first line
struct Summary {
    created: DateTime<Utc>,
    station: String,
    grid_square: String,
    position: Position,
    site: String,
    radio: String,
}

const SUMMARY_FIELDS: usize = 8;

const KEY_LAT_LON_ELV: &str = "lat_lon_elv";
const KEY_FIX_PDOP: &str = "gps_fix_pdop";
const KEY_SERIALS: &str = "rfdecksn_logicctrlrsn";
const KEY_SAMPLE_RATE: &str = "ad_sample_rate";
const KEY_ZERO_CAL: &str = "ad_zero_cal_data";

// zero-calibration words are offset binary
const ZERO_CAL_BIAS: i32 = 0x8000;

// Parse the structured first line
//
// `#,timestamp,station,grid,lat,lon,elev,site,radio`
fn parse_summary(line: &str) -> Result<Summary, HeaderDecodeError> {
    let parts: Vec<&str> = line
        .trim_start_matches(|c| c == '#' || c == ',')
        .split(',')
        .map(|p| p.trim())
        .collect();
    if parts.len() != SUMMARY_FIELDS {
        return Err(HeaderDecodeError::FieldCount(parts.len()));
    }

    let created = DateTime::parse_from_rfc3339(parts[0])
        .map_err(|_| HeaderDecodeError::InvalidTimestamp(parts[0].to_owned()))?
        .with_timezone(&Utc);

    Ok(Summary {
        created,
        station: parts[1].to_owned(),
        grid_square: parts[2].to_owned(),
        position: Position {
            latitude: parse_float("latitude", parts[3])?,
            longitude: parse_float("longitude", parts[4])?,
            elevation: parse_float("elevation", parts[5])?,
        },
        site: parts[6].to_owned(),
        radio: parts[7].to_owned(),
    })
}

fn parse_float(field: &'static str, value: &str) -> Result<f64, HeaderDecodeError> {
    value
        .parse()
        .map_err(|_| HeaderDecodeError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}

// Parse one `# key  value` line
//
// Returns None for decoration, section headers, and lines
// without a two-space separator.
fn parse_key_value(line: &str) -> Option<(String, FieldValue)> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^(.+?)\s{2,}(.+)$").expect("bad key/value regexp");
    }

    let line = line.trim_matches(|c| c == '#' || c == ' ');
    if line.is_empty() || line.starts_with(SECTION_HEADER) {
        return None;
    }

    let caps = RE.captures(line)?;
    let key = canonical_key(caps.get(1)?.as_str());
    if key.is_empty() {
        return None;
    }
    Some((key, FieldValue::parse(caps.get(2)?.as_str())))
}

const SECTION_HEADER: &str = "MetaData";

// A key/value header line, as read
struct FieldOrigin {
    key: String,
    line: usize,
    value: FieldValue,
}

// Header line responsible for an error, if there is one
fn error_line(err: &HeaderError, origins: &[FieldOrigin]) -> Option<usize> {
    // later duplicates replace earlier ones
    let by_key = |key: &str| origins.iter().rev().find(|o| o.key == key).map(|o| o.line);

    match err {
        HeaderError::Decode(HeaderDecodeError::InvalidField { field, .. }) if field == "pdop" => {
            by_key(KEY_FIX_PDOP)
        }
        HeaderError::Decode(HeaderDecodeError::InvalidField { field, .. }) => by_key(field),
        HeaderError::Decode(HeaderDecodeError::Composite(key)) => by_key(key),
        HeaderError::UnknownBeacon(UnknownBeaconError(name)) => origins
            .iter()
            .rev()
            .find(|o| {
                o.key.starts_with("beacon_") && o.value.as_text().as_deref() == Some(name.as_str())
            })
            .map(|o| o.line),
        _ => None,
    }
}

// Split or discard the known multi-valued fields
fn resolve_composites(fields: &mut BTreeMap<String, FieldValue>) -> Result<(), HeaderDecodeError> {
    // position is already known from the first line
    fields.remove(KEY_LAT_LON_ELV);

    if let Some(value) = fields.remove(KEY_FIX_PDOP) {
        let (fix, pdop) = split_pair(KEY_FIX_PDOP, &value)?;
        let pdop = match scalar(pdop) {
            FieldValue::Integer(i) => FieldValue::Float(i as f64),
            FieldValue::Float(f) => FieldValue::Float(f),
            _ => {
                return Err(HeaderDecodeError::InvalidField {
                    field: "pdop".into(),
                    value: pdop.to_owned(),
                })
            }
        };
        fields.insert("gps_fix".into(), scalar(fix));
        fields.insert("pdop".into(), pdop);
    }

    if let Some(value) = fields.remove(KEY_SERIALS) {
        let (rfdeck, logic) = split_pair(KEY_SERIALS, &value)?;
        fields.insert("rfdecksn".into(), FieldValue::Text(rfdeck.to_owned()));
        fields.insert("logicctrlrsn".into(), FieldValue::Text(logic.to_owned()));
    }

    Ok(())
}

fn split_pair<'v>(key: &str, value: &'v FieldValue) -> Result<(&'v str, &'v str), HeaderDecodeError> {
    match value.as_list() {
        Some([a, b]) => Ok((a.as_str(), b.as_str())),
        _ => Err(HeaderDecodeError::Composite(key.to_owned())),
    }
}

// Remove every `beacon_N…` key, returning names in slot order
fn take_beacons(fields: &mut BTreeMap<String, FieldValue>) -> Result<Vec<String>, HeaderDecodeError> {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^beacon_([0-9]+)(_|$)").expect("bad beacon regexp");
    }

    let mut slots: Vec<(u32, String)> = Vec::with_capacity(CHANNELS);
    let keys: Vec<String> = fields
        .keys()
        .filter(|k| RE.is_match(k))
        .cloned()
        .collect();

    for key in keys {
        let slot = RE
            .captures(&key)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .ok_or_else(|| HeaderDecodeError::InvalidField {
                field: key.clone(),
                value: String::new(),
            })?;

        let value = fields.remove(&key).unwrap_or(FieldValue::Text(String::new()));
        let name = match value.as_text() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(HeaderDecodeError::InvalidField {
                    field: key,
                    value: value.to_string(),
                })
            }
        };
        slots.push((slot, name));
    }

    if slots.len() != CHANNELS {
        return Err(HeaderDecodeError::BeaconSlots(slots.len()));
    }

    slots.sort_by_key(|(slot, _)| *slot);
    Ok(slots.into_iter().map(|(_, name)| name).collect())
}

fn take_sample_rate(fields: &mut BTreeMap<String, FieldValue>) -> Result<u32, HeaderDecodeError> {
    match fields.remove(KEY_SAMPLE_RATE) {
        Some(FieldValue::Integer(rate)) if rate > 0 && rate <= u32::MAX as i64 => Ok(rate as u32),
        Some(other) => Err(HeaderDecodeError::InvalidField {
            field: KEY_SAMPLE_RATE.into(),
            value: other.to_string(),
        }),
        None => Err(HeaderDecodeError::MissingField(KEY_SAMPLE_RATE)),
    }
}

fn take_zero_cal(
    fields: &mut BTreeMap<String, FieldValue>,
) -> Result<[i32; CHANNELS], HeaderDecodeError> {
    let value = fields
        .remove(KEY_ZERO_CAL)
        .ok_or(HeaderDecodeError::MissingField(KEY_ZERO_CAL))?;
    let invalid = || HeaderDecodeError::InvalidField {
        field: KEY_ZERO_CAL.into(),
        value: value.to_string(),
    };

    let words = value.as_list().ok_or_else(invalid)?;
    if words.len() != CHANNELS {
        return Err(invalid());
    }

    let mut out = [0i32; CHANNELS];
    for (dst, word) in out.iter_mut().zip(words) {
        let raw = u16::from_str_radix(word, 16).map_err(|_| invalid())?;
        *dst = raw as i32 - ZERO_CAL_BIAS;
    }
    Ok(out)
}

// Number, if it looks like one, else text
fn scalar(value: &str) -> FieldValue {
    let digits_only = !value.is_empty()
        && value.chars().filter(|&c| c == '.').count() <= 1
        && value.chars().all(|c| c.is_ascii_digit() || c == '.')
        && value.chars().any(|c| c.is_ascii_digit());

    if digits_only {
        if value.contains('.') {
            if let Ok(f) = value.parse() {
                return FieldValue::Float(f);
            }
        } else if let Ok(i) = value.parse() {
            return FieldValue::Integer(i);
        }
    }
    FieldValue::Text(value.to_owned())
}

// Characters permitted in a numeric-looking list
fn is_list_char(c: char) -> bool {
    c.is_ascii_hexdigit() || matches!(c, ',' | '.' | '-' | '+' | ' ')
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;
    use chrono::TimeZone;

    use crate::testdata::HEADER;

    fn parse(text: &str) -> Result<ConfigurationRecord, HeaderError> {
        HeaderMetadataParser::default().parse(text.lines())
    }

    #[test]
    fn test_parse_full_header() {
        let rec = parse(HEADER).expect("bad header");

        assert_eq!(rec.created(), &Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap());
        assert_eq!(rec.station(), "N0001002");
        assert_eq!(rec.grid_square(), "FN42el");
        assert_approx_eq!(rec.position().latitude, 42.49834);
        assert_approx_eq!(rec.position().longitude, -71.590725);
        assert_approx_eq!(rec.position().elevation, 128.6);
        assert_eq!(rec.site(), "Harvard MA");
        assert_eq!(rec.radio(), "Grape 2");

        assert_eq!(rec.beacons(), &["WWV5", "WWV10", "WWV15"]);
        assert_eq!(rec.center_frequencies().len(), rec.beacons().len());
        assert_eq!(rec.center_frequencies(), &[5.0e6, 10.0e6, 15.0e6]);
        assert_eq!(rec.sample_rate(), 8000);
        assert_eq!(rec.zero_cal(), &[-290, -249, -214]);

        assert_eq!(rec.field("callsign"), Some(&FieldValue::Text("AB1XB".into())));
        assert_eq!(rec.field("rfgain"), Some(&FieldValue::Integer(10)));
        assert_eq!(
            rec.field("antenna"),
            Some(&FieldValue::Text("MLA-30+ active wideband loop".into()))
        );
        assert_eq!(
            rec.field("data_controller_version"),
            Some(&FieldValue::Text("0.7.16".into()))
        );
        assert_eq!(
            rec.field("system_info"),
            Some(&FieldValue::Text(
                "RasPi4B/8GB, RasPi OS Bullseye 6.1.21".into()
            ))
        );

        // composites
        assert_eq!(rec.field("gps_fix"), Some(&FieldValue::Integer(3)));
        assert_eq!(rec.field("pdop"), Some(&FieldValue::Float(1.9)));
        assert_eq!(rec.field("rfdecksn"), Some(&FieldValue::Text("102".into())));
        assert_eq!(rec.field("logicctrlrsn"), Some(&FieldValue::Text("1002".into())));
        assert!(rec.field("lat_lon_elv").is_none());
        assert!(rec.field("gps_fix_pdop").is_none());
        assert!(rec.field("rfdecksn_logicctrlrsn").is_none());

        // structured fields are not duplicated in the free map
        assert!(rec.field("ad_sample_rate").is_none());
        assert!(rec.field("ad_zero_cal_data").is_none());
        assert!(rec.field("beacon_1_now_decoded").is_none());
        assert!(rec.field("metadata_for_grape_gen_2_station").is_none());
    }

    #[test]
    fn test_to_map() {
        let rec = parse(HEADER).expect("bad header");
        let map = rec.to_map();
        assert_eq!(map["ad_sample_rate"], 8000);
        assert_eq!(map["station_node_number"], "N0001002");
        assert_eq!(map["beacon_2_now_decoded"], "WWV10");
        assert_eq!(map["rfgain"], 10);
        assert_eq!(map["ad_zero_cal_data"], serde_json::json!([-290, -249, -214]));
        assert_eq!(map["center_frequencies"], serde_json::json!([5.0e6, 10.0e6, 15.0e6]));
    }

    #[test]
    fn test_beacon_slot_order() {
        let text = HEADER
            .replace("Beacon 1 Now Decoded     WWV5", "Beacon 3 Now Decoded     WWV5")
            .replace("Beacon 3 Now Decoded     WWV15", "Beacon 1 Now Decoded     WWV15");
        let rec = parse(&text).expect("bad header");
        assert_eq!(rec.beacons(), &["WWV15", "WWV10", "WWV5"]);
        assert_eq!(rec.center_frequencies(), &[15.0e6, 10.0e6, 5.0e6]);
    }

    #[test]
    fn test_unknown_beacon() {
        let text = HEADER.replace("WWV10", "WWV11");
        assert_eq!(
            Err(HeaderError::UnknownBeacon(UnknownBeaconError("WWV11".into()))),
            parse(&text)
        );

        // a custom table changes what is known
        let parser = HeaderMetadataParser::new(BeaconTable::from_iter([
            ("WWV5", 5.0e6),
            ("WWV11", 11.0e6),
            ("WWV15", 15.0e6),
        ]));
        let rec = parser.parse(text.lines()).expect("bad header");
        assert_eq!(rec.center_frequencies(), &[5.0e6, 11.0e6, 15.0e6]);
    }

    #[test]
    fn test_bad_first_line() {
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::Missing)),
            HeaderMetadataParser::default().parse(Vec::<String>::new())
        );

        let text = HEADER.replacen(",Grape 2", "", 1);
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::FieldCount(7))),
            parse(&text)
        );

        let text = HEADER.replacen("42.498340,-71", "north,-71", 1);
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::InvalidNumber {
                field: "latitude",
                value: "north".into()
            })),
            parse(&text)
        );

        let text = HEADER.replacen("2024-04-08T00:00:00Z", "yesterday", 1);
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::InvalidTimestamp(
                "yesterday".into()
            ))),
            parse(&text)
        );
    }

    #[test]
    fn test_required_fields() {
        let text = HEADER.replace("# A/D Sample Rate          8000\n", "");
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::MissingField(
                "ad_sample_rate"
            ))),
            parse(&text)
        );

        let text = HEADER.replace("# A/D Zero Cal Data        7ede,7f07,7f2a\n", "");
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::MissingField(
                "ad_zero_cal_data"
            ))),
            parse(&text)
        );

        let text = HEADER.replace("7ede,7f07,7f2a", "7ede,7f07");
        assert!(matches!(
            parse(&text),
            Err(HeaderError::Decode(HeaderDecodeError::InvalidField { .. }))
        ));

        let text = HEADER.replace("Rate          8000", "Rate          fast");
        assert!(matches!(
            parse(&text),
            Err(HeaderError::Decode(HeaderDecodeError::InvalidField { .. }))
        ));

        let text = HEADER.replace("# Beacon 3 Now Decoded     WWV15\n", "");
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::BeaconSlots(2))),
            parse(&text)
        );
    }

    #[test]
    fn test_bad_composite() {
        let text = HEADER.replace("3,1.9", "3");
        assert_eq!(
            Err(HeaderError::Decode(HeaderDecodeError::Composite(
                "gps_fix_pdop".into()
            ))),
            parse(&text)
        );
    }

    #[test]
    fn test_value_conversion() {
        assert_eq!(FieldValue::Integer(10), FieldValue::parse("10"));
        assert_eq!(FieldValue::Float(0.5), FieldValue::parse("0.5"));
        assert_eq!(FieldValue::Text("0.7.16".into()), FieldValue::parse("0.7.16"));
        assert_eq!(FieldValue::Text("-71.5".into()), FieldValue::parse("-71.5"));
        assert_eq!(
            FieldValue::List(vec!["42.5".into(), "-71.5".into(), "128.6".into()]),
            FieldValue::parse("42.5,-71.5,128.6")
        );
        assert_eq!(
            FieldValue::Text("RasPi4B/8GB, RasPi OS".into()),
            FieldValue::parse("RasPi4B/8GB, RasPi OS")
        );
    }

    #[test]
    fn test_canonical_key() {
        assert_eq!("station_node_number", canonical_key("Station Node Number"));
        assert_eq!("rfgain", canonical_key("RFGain"));
        assert_eq!("rfdecksn_logicctrlrsn", canonical_key("RFDeckSN, LogicCtrlrSN"));
        assert_eq!("ad_zero_cal_data", canonical_key("A/D Zero Cal Data"));
        assert_eq!("beacon_1_now_decoded", canonical_key("Beacon 1 Now Decoded"));
        assert_eq!("", canonical_key("---"));
    }

    #[test]
    fn test_read_header() {
        let text = format!("{}\nT20240408000000L3A1\n0000,0000,0000\n", HEADER);
        let mut reader = std::io::Cursor::new(text);
        let (rec, next, consumed) = HeaderMetadataParser::default()
            .read_header(&mut reader)
            .expect("bad header");
        assert_eq!(rec.sample_rate(), 8000);
        assert_eq!(next.as_deref(), Some("T20240408000000L3A1"));
        assert_eq!(consumed, HEADER.lines().count() + 1);

        let mut rest = String::new();
        std::io::Read::read_to_string(&mut reader, &mut rest).unwrap();
        assert_eq!(rest, "0000,0000,0000\n");
    }

    fn error_line_of(text: &str) -> usize {
        let mut reader = std::io::Cursor::new(format!("{}\nT20240408000000L3A1\n", text));
        match HeaderMetadataParser::default().read_header(&mut reader) {
            Err(HeaderReadError::Header { line, .. }) => line,
            other => panic!("expected header error, got {:?}", other.map(|r| r.2)),
        }
    }

    fn line_of(text: &str, needle: &str) -> usize {
        text.lines().position(|l| l.contains(needle)).expect("no such line") + 1
    }

    #[test]
    fn test_error_lines() {
        let text = HEADER.replace("7ede,7f07,7f2a", "7ede,7f07");
        assert_eq!(error_line_of(&text), line_of(&text, "A/D Zero Cal Data"));
        assert!(error_line_of(&text) > 20);

        let text = HEADER.replace("Rate          8000", "Rate          fast");
        assert_eq!(error_line_of(&text), line_of(&text, "A/D Sample Rate"));

        let text = HEADER.replace("WWV10", "WWV11");
        assert_eq!(error_line_of(&text), line_of(&text, "Beacon 2 Now Decoded"));

        let text = HEADER.replace("3,1.9", "3");
        assert_eq!(error_line_of(&text), line_of(&text, "GPS Fix,PDOP"));

        let text = HEADER.replace("3,1.9", "3,fast");
        assert_eq!(error_line_of(&text), line_of(&text, "GPS Fix,PDOP"));

        // first-line problems
        let text = HEADER.replacen(",Grape 2", "", 1);
        assert_eq!(error_line_of(&text), 1);

        // a missing field is reported at the end of the header
        let text = HEADER.replace("# A/D Sample Rate          8000\n", "");
        assert_eq!(error_line_of(&text), text.lines().count());

        // no header at all
        let mut reader = std::io::Cursor::new("T20240408000000L3A1\n");
        assert!(matches!(
            HeaderMetadataParser::default().read_header(&mut reader),
            Err(HeaderReadError::Header {
                source: HeaderError::Decode(HeaderDecodeError::Missing),
                line: 1
            })
        ));
    }
}
