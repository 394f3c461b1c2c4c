//! Per-day conversion loop

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{error, info, warn};

use grapestream::{Archive, Ingestor};

/// Station files for `date`, in name order
///
/// Selects the regular files in `station_dir` whose names begin
/// with the `YYYY-MM-DD` date and end in `.csv`.
pub fn discover_files(station_dir: &Path, date: NaiveDate) -> io::Result<Vec<PathBuf>> {
    let prefix = date.format("%Y-%m-%d").to_string();

    let mut files = Vec::new();
    for entry in fs::read_dir(station_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if name.starts_with(&prefix) && name.ends_with(".csv") {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// Convert each of `dates`
///
/// Days are independent. A day which fails is logged and the
/// remaining days are still converted. Returns the dates which
/// failed.
pub fn run<A: Archive>(
    ingestor: &Ingestor,
    archive: &mut A,
    station_dir: &Path,
    dates: &[NaiveDate],
) -> Vec<NaiveDate> {
    let mut failed = Vec::new();

    for &date in dates {
        info!("{}: converting", date);

        let files = match discover_files(station_dir, date) {
            Ok(files) => files,
            Err(e) => {
                error!(
                    "{}: unable to list \"{}\": {}",
                    date,
                    station_dir.display(),
                    e
                );
                failed.push(date);
                continue;
            }
        };
        if files.is_empty() {
            warn!(
                "{}: no files named \"{}*.csv\" in \"{}\"",
                date,
                date,
                station_dir.display()
            );
            continue;
        }
        info!("{}: {} file(s)", date, files.len());

        match ingestor.process_day(date, &files, archive) {
            Ok(Some(summary)) => info!("{}", summary),
            Ok(None) => {}
            Err(e) => {
                error!("{}: day discarded: {}", date, e);
                failed.push(date);
            }
        }
    }

    failed
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use grapestream::{DirectoryArchive, IngestorBuilder};

    const HEADER: &str = "\
#,2024-04-08T00:00:00Z,N0001002,FN42el,42.498340,-71.590725,128.6,Harvard MA,Grape 2
# Beacon 1 Now Decoded     WWV5
# Beacon 2 Now Decoded     WWV10
# Beacon 3 Now Decoded     WWV15
# A/D Sample Rate          2
# A/D Zero Cal Data        8000,8000,8000";

    fn write_station_file(path: &Path, seconds: u32) {
        let mut out = fs::File::create(path).expect("create");
        writeln!(out, "{}", HEADER).unwrap();
        for sec in 0..seconds {
            writeln!(out, "T202404080000{:02}L3A1", sec).unwrap();
            writeln!(out, "8001,8002,8003").unwrap();
            writeln!(out, "8004,8005,8006").unwrap();
            writeln!(out, "C0000ABCDV").unwrap();
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 8).unwrap()
    }

    #[test]
    fn test_discover_files() {
        let dir = tempfile::tempdir().expect("no tempdir");
        for name in [
            "2024-04-08T010000Z_N0001002_RAWDATA.csv",
            "2024-04-08T000000Z_N0001002_RAWDATA.csv",
            "2024-04-09T000000Z_N0001002_RAWDATA.csv",
            "2024-04-08T020000Z_N0001002_RAWDATA.txt",
            "notes-2024-04-08.csv",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("2024-04-08-old.csv")).unwrap();

        let files = discover_files(dir.path(), day()).expect("list");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "2024-04-08T000000Z_N0001002_RAWDATA.csv",
                "2024-04-08T010000Z_N0001002_RAWDATA.csv",
            ]
        );

        assert!(discover_files(&dir.path().join("nope"), day()).is_err());
    }

    #[test]
    fn test_run() {
        let input = tempfile::tempdir().expect("no tempdir");
        let output = tempfile::tempdir().expect("no tempdir");
        write_station_file(&input.path().join("2024-04-08T000000Z_N0001002_RAWDATA.csv"), 4);
        fs::write(
            input.path().join("2024-04-09T000000Z_N0001002_RAWDATA.csv"),
            "T20240409000000L3A1\n",
        )
        .unwrap();

        let ingestor = IngestorBuilder::new()
            .with_seconds_per_file(4)
            .with_uuid("abc")
            .build();
        let mut archive = DirectoryArchive::new(output.path());

        let dates = [
            day(),
            NaiveDate::from_ymd_opt(2024, 4, 9).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 10).unwrap(),
        ];
        let failed = run(&ingestor, &mut archive, input.path(), &dates);

        // the 9th has no header; the 10th has no files
        assert_eq!(failed, vec![dates[1]]);
        assert!(archive.channel_dir(day()).is_dir());
        assert!(!archive.day_dir(dates[1]).exists());
        assert!(!archive.day_dir(dates[2]).exists());
    }
}
