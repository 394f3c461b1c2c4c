//! Station file fixtures for unit tests

use std::io::Write;

pub(crate) const HEADER: &str = "#,2024-04-08T00:00:00Z,N0001002,FN42el,42.498340,-71.590725,128.6,Harvard MA,Grape 2
######################################################
# MetaData for Grape Gen 2 Station
#
# Station Node Number      N0001002
# Callsign                 AB1XB
# Grid Square              FN42el
# Lat, Lon, Elv            42.498340,-71.590725,128.6
# GPS Fix,PDOP             3,1.9
# GPS Acquisition on       2024-04-06 21:23:43.740476
# City State               Harvard MA
# RFGain                   10
# Antenna                  MLA-30+ active wideband loop
# Frequency Standard       LB GPSDO
# System Info              RasPi4B/8GB, RasPi OS Bullseye 6.1.21
# RFDeckSN, LogicCtrlrSN   102,1002
# Data Controller Version  0.7.16
#
# Beacon 1 Now Decoded     WWV5
# Beacon 2 Now Decoded     WWV10
# Beacon 3 Now Decoded     WWV15
#
# A/D Sample Rate          8000
# A/D Zero Cal Data        7ede,7f07,7f2a
#
######################################################";

/// Station header with a different A/D sample rate
pub(crate) fn header_with_rate(rate: u32) -> String {
    HEADER.replace(
        "8000\n# A/D Zero",
        &format!("{}\n# A/D Zero", rate),
    )
}

/// Raw (uncalibrated) sample words for absolute row `n`
pub(crate) fn raw_row(n: usize) -> [u16; 3] {
    [
        (n % 65536) as u16,
        ((n * 7 + 0x7f00) % 65536) as u16,
        ((n * 13 + 0xc000) % 65536) as u16,
    ]
}

/// Build the text of a station file
///
/// Writes `header`, then one cycle for each epoch second in
/// `seconds` with `rows` data rows each. Row contents follow
/// [`raw_row()`], numbered from zero across the whole file.
pub(crate) fn station_file<I>(header: &str, seconds: I, rows: usize) -> String
where
    I: IntoIterator<Item = i64>,
{
    let mut out = Vec::new();
    write_station_file(&mut out, header, seconds, rows).expect("bad test file");
    String::from_utf8(out).expect("bad test file")
}

/// Stream a station file, as [`station_file()`]
pub(crate) fn write_station_file<W, I>(
    out: W,
    header: &str,
    seconds: I,
    rows: usize,
) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = i64>,
{
    let mut out = std::io::BufWriter::new(out);
    writeln!(out, "{}", header)?;

    let mut n = 0usize;
    for sec in seconds {
        let time = chrono::DateTime::from_timestamp(sec, 0).expect("bad test time");
        writeln!(out, "T{}L3A1", time.format("%Y%m%d%H%M%S"))?;
        for _ in 0..rows {
            let [a, b, c] = raw_row(n);
            writeln!(out, "{:04X},{:04X},{:04x}", a, b, c)?;
            n += 1;
        }
        writeln!(out, "C{:08X}V", sec as u32)?;
    }
    out.flush()
}

/// Calibrated row `n` under the [`HEADER`] zero-cal
pub(crate) fn calibrated_row(n: usize) -> [i32; 3] {
    let [a, b, c] = raw_row(n);
    [a as i32 - 290, b as i32 - 249, c as i32 - 214]
}

/// Epoch second of 2024-04-08T00:00:00Z
pub(crate) const DAY_START_EPOCH: i64 = 1712534400;
