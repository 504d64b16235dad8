//! EXIF metadata extraction: capture timestamp and GPS DMS triples.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{In, Tag, Value};

use crate::error::{Error, Result};
use crate::geo::coords::{DmsAngle, GpsPosition, Hemisphere};
use crate::scanner::PhotoRecord;

/// EXIF datetime encoding, also used for the mapping-table timestamp columns.
pub const TIMESTAMP_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Read one image's metadata into a [`PhotoRecord`]. An unreadable file or a
/// file without an EXIF container is a [`Error::CorruptImage`]; EXIF present
/// but missing timestamp or GPS fields produces a record with those fields
/// unset.
pub fn read_photo_record(path: &Path) -> Result<PhotoRecord> {
    let corrupt = |reason: String| Error::CorruptImage {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| corrupt(e.to_string()))?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new()
        .read_from_container(&mut bufreader)
        .map_err(|e| corrupt(e.to_string()))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(PhotoRecord {
        filename,
        directory,
        captured_at: read_capture_timestamp(&exif),
        position: read_gps_position(&exif),
    })
}

/// Capture timestamp, preferring DateTimeOriginal over the digitized and
/// plain variants. EXIF datetimes carry no timezone; they are local time
/// as-is.
pub fn read_capture_timestamp(exif: &exif::Exif) -> Option<NaiveDateTime> {
    let tags = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

    for tag in &tags {
        if let Some(field) = exif.get_field(*tag, In::PRIMARY) {
            let raw = field.display_value().to_string();
            let raw = raw.trim_matches('"');
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
                return Some(dt);
            }
        }
    }

    None
}

fn read_gps_position(exif: &exif::Exif) -> Option<GpsPosition> {
    let lat_field = exif.get_field(Tag::GPSLatitude, In::PRIMARY)?;
    let lat_ref = exif.get_field(Tag::GPSLatitudeRef, In::PRIMARY)?;
    let long_field = exif.get_field(Tag::GPSLongitude, In::PRIMARY)?;
    let long_ref = exif.get_field(Tag::GPSLongitudeRef, In::PRIMARY)?;

    let lat = rational_triple(&lat_field.value)?;
    let long = rational_triple(&long_field.value)?;
    let lat_hemi = hemisphere_of(lat_ref, Hemisphere::North)?;
    let long_hemi = hemisphere_of(long_ref, Hemisphere::East)?;

    Some(GpsPosition::new(
        dms_from_triple(lat, lat_hemi),
        dms_from_triple(long, long_hemi),
    ))
}

fn rational_triple(value: &Value) -> Option<(f64, f64, f64)> {
    if let Value::Rational(v) = value {
        if v.len() >= 3 {
            return Some((v[0].to_f64(), v[1].to_f64(), v[2].to_f64()));
        }
    }
    None
}

fn hemisphere_of(field: &exif::Field, fallback: Hemisphere) -> Option<Hemisphere> {
    let raw = field.display_value().to_string();
    let c = raw.trim_matches('"').chars().next()?;
    Some(Hemisphere::from_char(c).unwrap_or(fallback))
}

/// Build a [`DmsAngle`] from the raw EXIF rationals, carrying any fractional
/// degrees/minutes down into seconds.
fn dms_from_triple((d, m, s): (f64, f64, f64), hemisphere: Hemisphere) -> DmsAngle {
    let degrees = d.floor();
    let minutes_total = m + (d - degrees) * 60.0;
    let minutes = minutes_total.floor();
    let seconds = s + (minutes_total - minutes) * 60.0;

    DmsAngle::new(degrees as u32, minutes as u32, seconds, hemisphere)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dms_from_triple_integral() {
        let dms = dms_from_triple((41.0, 23.0, 12.5), Hemisphere::North);
        assert_eq!(dms.degrees, 41);
        assert_eq!(dms.minutes, 23);
        assert!((dms.seconds - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_dms_from_triple_carries_fractional_minutes() {
        // 23.5 minutes becomes 23 minutes 30 seconds
        let dms = dms_from_triple((41.0, 23.5, 0.0), Hemisphere::South);
        assert_eq!(dms.minutes, 23);
        assert!((dms.seconds - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_read_photo_record_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_image.jpg");
        std::fs::write(&path, b"plain text").unwrap();

        let err = read_photo_record(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptImage { .. }));
    }
}
