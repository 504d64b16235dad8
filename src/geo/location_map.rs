//! Reduce place visits to mapping-table rows and persist them as CSV.

use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};
use crate::geo::coords::{Axis, DmsAngle};
use crate::geo::grouper::PlaceGroup;
use crate::scanner::TIMESTAMP_FORMAT;

/// One row of the durable location mapping table: a time window, the
/// averaged coordinate of the visit, and how many photos backed the average.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMapEntry {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub lat: f64,
    pub long: f64,
    pub lat_dms: DmsAngle,
    pub long_dms: DmsAngle,
    pub n_pics: usize,
}

impl LocationMapEntry {
    /// Inclusive window containment.
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    /// Window length, for tie-breaking between overlapping entries.
    pub fn window_seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Reduce each group to one [`LocationMapEntry`]. Deterministic: identical
/// groups always yield identical entries.
///
/// Members without a GPS fix are excluded from the average and from
/// `n_pics`, with the excluded count logged per group. A group with no
/// GPS-bearing members at all has no average to offer and is an error.
pub fn summarize(groups: &[PlaceGroup]) -> Result<Vec<LocationMapEntry>> {
    let mut entries = Vec::with_capacity(groups.len());

    for group in groups {
        let (Some(first), Some(last)) = (group.records.first(), group.records.last()) else {
            continue;
        };

        let start = first.captured_at.ok_or_else(|| Error::MissingTimestamp {
            filename: first.filename.clone(),
        })?;
        let end = last.captured_at.ok_or_else(|| Error::MissingTimestamp {
            filename: last.filename.clone(),
        })?;

        let decimals: Vec<(f64, f64)> = group
            .records
            .iter()
            .filter_map(|r| r.position.as_ref().map(|p| p.decimal()))
            .collect();

        if decimals.is_empty() {
            return Err(Error::NoCoordinatesInGroup { start });
        }

        let excluded = group.len() - decimals.len();
        if excluded > 0 {
            tracing::warn!(
                start = %start,
                excluded,
                "photos without GPS excluded from the group average"
            );
        }

        let n = decimals.len() as f64;
        let lat = decimals.iter().map(|(lat, _)| lat).sum::<f64>() / n;
        let long = decimals.iter().map(|(_, long)| long).sum::<f64>() / n;

        tracing::debug!(
            start = %start,
            end = %end,
            lat,
            long,
            photos = group.len(),
            "summarized visit"
        );

        entries.push(LocationMapEntry {
            start,
            end,
            lat,
            long,
            lat_dms: DmsAngle::from_decimal(lat, Axis::Latitude),
            long_dms: DmsAngle::from_decimal(long, Axis::Longitude),
            n_pics: decimals.len(),
        });
    }

    Ok(entries)
}

const HEADERS: [&str; 7] = ["start", "end", "lat", "long", "lat_dms", "long_dms", "n_pics"];

/// Serialize the full entry sequence to `path`, overwriting any prior table.
pub fn write_location_map(entries: &[LocationMapEntry], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(HEADERS)?;
    for entry in entries {
        wtr.write_record([
            entry.start.format(TIMESTAMP_FORMAT).to_string(),
            entry.end.format(TIMESTAMP_FORMAT).to_string(),
            entry.lat.to_string(),
            entry.long.to_string(),
            entry.lat_dms.to_string(),
            entry.long_dms.to_string(),
            entry.n_pics.to_string(),
        ])?;
    }

    wtr.flush()?;
    tracing::info!(rows = entries.len(), path = %path.display(), "location map written");
    Ok(())
}

/// Read the table back, validating each row's window. Read fully into memory;
/// an unreadable table aborts the run.
pub fn read_location_map(path: &Path) -> Result<Vec<LocationMapEntry>> {
    let table_error = |reason: String| Error::MappingTable {
        path: path.display().to_string(),
        reason,
    };

    let mut rdr = csv::Reader::from_path(path)?;
    let mut entries = Vec::new();

    for result in rdr.records() {
        let row = result?;
        if row.len() != HEADERS.len() {
            return Err(table_error(format!("expected {} columns, got {}", HEADERS.len(), row.len())));
        }

        let start = parse_timestamp(&row[0])?;
        let end = parse_timestamp(&row[1])?;
        if start > end {
            return Err(Error::InvalidWindow { start, end });
        }

        let lat: f64 = row[2].parse().map_err(|_| table_error(format!("bad latitude '{}'", &row[2])))?;
        let long: f64 = row[3].parse().map_err(|_| table_error(format!("bad longitude '{}'", &row[3])))?;
        let lat_dms = DmsAngle::from_str(&row[4])?;
        let long_dms = DmsAngle::from_str(&row[5])?;
        let n_pics: usize = row[6].parse().map_err(|_| table_error(format!("bad photo count '{}'", &row[6])))?;

        entries.push(LocationMapEntry {
            start,
            end,
            lat,
            long,
            lat_dms,
            long_dms,
            n_pics,
        });
    }

    tracing::info!(rows = entries.len(), path = %path.display(), "location map loaded");
    Ok(entries)
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        Error::InvalidTimestamp {
            value: raw.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::coords::GpsPosition;
    use crate::scanner::PhotoRecord;

    fn record(name: &str, time: &str, pos: Option<(f64, f64)>) -> PhotoRecord {
        PhotoRecord {
            filename: name.to_string(),
            directory: "/pics".to_string(),
            captured_at: Some(
                NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S").unwrap(),
            ),
            position: pos.map(|(lat, long)| GpsPosition::from_decimal(lat, long)),
        }
    }

    fn group(records: Vec<PhotoRecord>) -> PlaceGroup {
        PlaceGroup { records }
    }

    #[test]
    fn test_summarize_window_and_average() {
        let g = group(vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.0, 2.0))),
            record("b.jpg", "2020-06-01 10:30:00", Some((43.0, 4.0))),
        ]);

        let entries = summarize(&[g]).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.start.to_string(), "2020-06-01 10:00:00");
        assert_eq!(entry.end.to_string(), "2020-06-01 10:30:00");
        assert!((entry.lat - 42.0).abs() < 1e-9);
        assert!((entry.long - 3.0).abs() < 1e-9);
        assert_eq!(entry.n_pics, 2);
        assert!((entry.lat_dms.to_decimal() - 42.0).abs() < 1e-6);
    }

    #[test]
    fn test_summarize_excludes_gpsless_from_average_and_count() {
        let g = group(vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.0, 2.0))),
            record("nogps.jpg", "2020-06-01 10:10:00", None),
            record("b.jpg", "2020-06-01 10:30:00", Some((43.0, 4.0))),
        ]);

        let entries = summarize(&[g]).unwrap();
        let entry = &entries[0];

        // the GPS-less member widens neither the average nor the count, but
        // still bounds the window
        assert!((entry.lat - 42.0).abs() < 1e-9);
        assert_eq!(entry.n_pics, 2);
        assert_eq!(entry.end.to_string(), "2020-06-01 10:30:00");
    }

    #[test]
    fn test_summarize_rejects_all_gpsless_group() {
        let g = group(vec![record("nogps.jpg", "2020-06-01 10:00:00", None)]);

        let err = summarize(&[g]).unwrap_err();
        assert!(matches!(err, Error::NoCoordinatesInGroup { .. }));
    }

    #[test]
    fn test_summarize_is_deterministic() {
        let make = || {
            group(vec![
                record("a.jpg", "2020-06-01 10:00:00", Some((41.123456, 2.654321))),
                record("b.jpg", "2020-06-01 10:30:00", Some((-33.9, 151.2))),
            ])
        };

        let first = summarize(&[make()]).unwrap();
        let second = summarize(&[make()]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_read_round_trip() {
        let g = group(vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((-33.865143, 151.2099))),
            record("b.jpg", "2020-06-01 10:30:00", Some((-33.865150, 151.2101))),
        ]);
        let entries = summarize(&[g]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("location_map.csv");
        write_location_map(&entries, &path).unwrap();

        let loaded = read_location_map(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].start, entries[0].start);
        assert_eq!(loaded[0].end, entries[0].end);
        assert!((loaded[0].lat - entries[0].lat).abs() < 1e-9);
        assert!((loaded[0].long - entries[0].long).abs() < 1e-9);
        assert_eq!(loaded[0].n_pics, 2);
        // the DMS string columns recover the decimal within EXIF precision
        assert!((loaded[0].lat_dms.to_decimal() - entries[0].lat).abs() < 1e-6);
        assert!((loaded[0].long_dms.to_decimal() - entries[0].long).abs() < 1e-6);
    }

    #[test]
    fn test_write_overwrites_prior_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("location_map.csv");

        let g1 = group(vec![record("a.jpg", "2020-06-01 10:00:00", Some((41.0, 2.0)))]);
        let g2 = group(vec![record("b.jpg", "2021-01-01 09:00:00", Some((48.0, 3.0)))]);

        write_location_map(&summarize(&[g1.clone(), g2]).unwrap(), &path).unwrap();
        write_location_map(&summarize(&[g1]).unwrap(), &path).unwrap();

        assert_eq!(read_location_map(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_read_rejects_inverted_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "start,end,lat,long,lat_dms,long_dms,n_pics\n\
             2020:06:02 10:00:00,2020:06:01 10:00:00,41.0,2.0,41°0'0.000\"N,2°0'0.000\"E,1\n",
        )
        .unwrap();

        let err = read_location_map(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidWindow { .. }));
    }

    #[test]
    fn test_read_rejects_bad_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "start,end,lat,long,lat_dms,long_dms,n_pics\n\
             yesterday,2020:06:01 10:00:00,41.0,2.0,41°0'0.000\"N,2°0'0.000\"E,1\n",
        )
        .unwrap();

        let err = read_location_map(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp { .. }));
    }
}
