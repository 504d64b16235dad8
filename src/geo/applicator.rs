//! Write inferred GPS/time back into photos that lack them.
//!
//! A photo's timestamp is looked up in the location mapping table by window
//! containment; on a match the entry's coordinate and the photo's timestamp
//! are written into a copy of the image (EXIF datetime fields plus GPS DMS
//! rationals) and the copy's file times are set to the same timestamp.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use filetime::FileTime;
use img_parts::jpeg::Jpeg;
use img_parts::ImageEXIF;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::coords::{DmsAngle, GpsPosition};
use crate::geo::location_map::LocationMapEntry;
use crate::scanner::{convention, metadata, TIMESTAMP_FORMAT};

/// How to resolve a timestamp that falls inside several overlapping windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowTieBreak {
    /// First matching entry in table order.
    #[default]
    FirstMatch,
    /// The shortest matching window, table order breaking exact ties.
    NarrowestWindow,
}

/// Where a photo's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    Exif,
    Filename,
    FileModified,
}

/// Find the mapping entry whose window contains `timestamp`. Overlapping
/// matches are ambiguous: they raise a warning and resolve per `tie_break`.
pub fn lookup<'a>(
    timestamp: NaiveDateTime,
    entries: &'a [LocationMapEntry],
    tie_break: WindowTieBreak,
) -> Option<&'a LocationMapEntry> {
    let mut matches = entries.iter().filter(|e| e.contains(timestamp));
    let first = matches.next()?;
    let rest: Vec<&LocationMapEntry> = matches.collect();

    if rest.is_empty() {
        return Some(first);
    }

    tracing::warn!(
        %timestamp,
        windows = rest.len() + 1,
        "timestamp inside overlapping location windows"
    );
    match tie_break {
        WindowTieBreak::FirstMatch => Some(first),
        WindowTieBreak::NarrowestWindow => std::iter::once(first)
            .chain(rest)
            .min_by_key(|e| e.window_seconds()),
    }
}

/// Resolve a capture timestamp for `path`: EXIF first, then the
/// capture-convention filename, then the file's modification time.
pub fn resolve_timestamp(path: &Path, pattern: &Regex) -> Result<(NaiveDateTime, TimestampSource)> {
    if let Ok(record) = metadata::read_photo_record(path) {
        if let Some(dt) = record.captured_at {
            return Ok((dt, TimestampSource::Exif));
        }
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Some(dt) = convention::datetime_from_filename(pattern, &filename) {
        return Ok((dt, TimestampSource::Filename));
    }

    let modified = fs::metadata(path)?.modified()?;
    let local: DateTime<Local> = modified.into();
    Ok((local.naive_local(), TimestampSource::FileModified))
}

/// The inference applied to one photo.
#[derive(Debug, Clone)]
pub struct AppliedLocation {
    pub timestamp: NaiveDateTime,
    pub source: TimestampSource,
    pub position: GpsPosition,
    pub dest: PathBuf,
}

/// Infer and write back location/time for one photo, producing a stamped copy
/// under `dest_dir`. No matching window leaves the source untouched and
/// returns [`Error::NoLocationMatch`]; the caller reports it and continues
/// the batch.
pub fn apply_to_photo(
    src: &Path,
    dest_dir: &Path,
    entries: &[LocationMapEntry],
    tie_break: WindowTieBreak,
    pattern: &Regex,
) -> Result<AppliedLocation> {
    let filename = src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (timestamp, source) = resolve_timestamp(src, pattern)?;
    tracing::debug!(file = %filename, %timestamp, source = ?source, "resolved timestamp");

    let Some(entry) = lookup(timestamp, entries, tie_break) else {
        return Err(Error::NoLocationMatch {
            filename,
            timestamp,
        });
    };

    let position = GpsPosition::new(entry.lat_dms, entry.long_dms);
    let dest = dest_dir.join(&filename);
    write_back(src, &dest, timestamp, Some(&position))?;

    Ok(AppliedLocation {
        timestamp,
        source,
        position,
        dest,
    })
}

/// Write a copy of `src` at `dest` with the three EXIF datetime fields set to
/// `timestamp`, GPS fields set to `position` when given, and file
/// access/modification times matching the timestamp.
///
/// The copy is staged under a temporary name and only renamed into place once
/// both the metadata write and the file-time update succeed, so a failure
/// never leaves a half-updated output.
pub fn write_back(
    src: &Path,
    dest: &Path,
    timestamp: NaiveDateTime,
    position: Option<&GpsPosition>,
) -> Result<()> {
    let data = fs::read(src)?;
    let mut jpeg = Jpeg::from_bytes(data.into()).map_err(|e| Error::CorruptImage {
        path: src.display().to_string(),
        reason: e.to_string(),
    })?;

    let payload = encode_exif(timestamp, position)?;
    jpeg.set_exif(Some(payload.into()));

    let staged_name = dest
        .file_name()
        .map(|n| format!("{}.part", n.to_string_lossy()))
        .unwrap_or_else(|| ".part".to_string());
    let staged = dest.with_file_name(staged_name);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&staged)?;
        jpeg.encoder().write_to(&mut file)?;

        let ft = FileTime::from_unix_time(local_epoch(timestamp), 0);
        filetime::set_file_times(&staged, ft, ft)?;

        fs::rename(&staged, dest)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&staged);
    }
    result
}

fn encode_exif(timestamp: NaiveDateTime, position: Option<&GpsPosition>) -> Result<Vec<u8>> {
    let datetime = timestamp.format(TIMESTAMP_FORMAT).to_string();
    let ascii = || Value::Ascii(vec![datetime.clone().into_bytes()]);

    let datetime_field = field(Tag::DateTime, ascii());
    let original_field = field(Tag::DateTimeOriginal, ascii());
    let digitized_field = field(Tag::DateTimeDigitized, ascii());

    let gps_fields = position.map(|pos| {
        [
            field(Tag::GPSLatitude, dms_rationals(&pos.latitude)),
            field(Tag::GPSLatitudeRef, hemisphere_ref(&pos.latitude)),
            field(Tag::GPSLongitude, dms_rationals(&pos.longitude)),
            field(Tag::GPSLongitudeRef, hemisphere_ref(&pos.longitude)),
        ]
    });

    let mut writer = Writer::new();
    writer.push_field(&datetime_field);
    writer.push_field(&original_field);
    writer.push_field(&digitized_field);
    if let Some(fields) = &gps_fields {
        for f in fields {
            writer.push_field(f);
        }
    }

    let mut buf = std::io::Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

fn field(tag: Tag, value: Value) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    }
}

fn dms_rationals(angle: &DmsAngle) -> Value {
    Value::Rational(vec![
        Rational {
            num: angle.degrees,
            denom: 1,
        },
        Rational {
            num: angle.minutes,
            denom: 1,
        },
        Rational {
            num: (angle.seconds * 1000.0).round() as u32,
            denom: 1000,
        },
    ])
}

fn hemisphere_ref(angle: &DmsAngle) -> Value {
    Value::Ascii(vec![vec![angle.hemisphere.as_char() as u8]])
}

/// EXIF datetimes are local time; map to a unix epoch for the file times,
/// falling back to UTC when the local mapping is ambiguous.
fn local_epoch(timestamp: NaiveDateTime) -> i64 {
    timestamp
        .and_local_timezone(Local)
        .single()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| timestamp.and_utc().timestamp())
}
