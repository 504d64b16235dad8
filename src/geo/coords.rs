//! Degrees-minutes-seconds coordinates and geodesic distance.

use std::fmt;
use std::str::FromStr;

use geoutils::Location;

use crate::error::Error;

/// Compass reference for one DMS angle. South and west negate the decimal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn as_char(&self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
            Hemisphere::East => 'E',
            Hemisphere::West => 'W',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Hemisphere::North),
            'S' => Some(Hemisphere::South),
            'E' => Some(Hemisphere::East),
            'W' => Some(Hemisphere::West),
            _ => None,
        }
    }

    fn sign(&self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

/// Which axis an angle measures; decides the hemisphere pair on conversion
/// from decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn hemisphere_for(&self, decimal: f64) -> Hemisphere {
        match (self, decimal < 0.0) {
            (Axis::Latitude, false) => Hemisphere::North,
            (Axis::Latitude, true) => Hemisphere::South,
            (Axis::Longitude, false) => Hemisphere::East,
            (Axis::Longitude, true) => Hemisphere::West,
        }
    }
}

/// One angular coordinate as an unsigned degrees-minutes-seconds triple plus
/// its hemisphere reference, matching the EXIF GPS encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DmsAngle {
    pub degrees: u32,
    pub minutes: u32,
    pub seconds: f64,
    pub hemisphere: Hemisphere,
}

impl DmsAngle {
    pub fn new(degrees: u32, minutes: u32, seconds: f64, hemisphere: Hemisphere) -> Self {
        Self {
            degrees,
            minutes,
            seconds,
            hemisphere,
        }
    }

    /// Convert decimal degrees to a DMS triple. The sign moves into the
    /// hemisphere reference.
    pub fn from_decimal(decimal: f64, axis: Axis) -> Self {
        let total_seconds = decimal.abs() * 3600.0;
        let seconds = total_seconds % 60.0;
        let total_minutes = (total_seconds / 60.0).floor();
        let minutes = (total_minutes % 60.0) as u32;
        let degrees = (total_minutes / 60.0).floor() as u32;

        Self {
            degrees,
            minutes,
            seconds,
            hemisphere: axis.hemisphere_for(decimal),
        }
    }

    /// Decimal degrees, negative for south/west.
    pub fn to_decimal(&self) -> f64 {
        let dd = self.degrees as f64 + self.minutes as f64 / 60.0 + self.seconds / 3600.0;
        dd * self.hemisphere.sign()
    }
}

impl fmt::Display for DmsAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}°{}'{:.3}\"{}",
            self.degrees,
            self.minutes,
            self.seconds,
            self.hemisphere.as_char()
        )
    }
}

impl FromStr for DmsAngle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidDms {
            value: s.to_string(),
        };

        let trimmed = s.trim();
        let hemi_char = trimmed.chars().last().ok_or_else(invalid)?;
        let hemisphere = Hemisphere::from_char(hemi_char).ok_or_else(invalid)?;
        let body = &trimmed[..trimmed.len() - hemi_char.len_utf8()];

        let mut parts = body.split(['°', '\'', '"']).filter(|p| !p.is_empty());
        let degrees: u32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let minutes: u32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let seconds: f64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;

        if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
            return Err(invalid());
        }

        Ok(DmsAngle::new(degrees, minutes, seconds, hemisphere))
    }
}

/// A full GPS fix: latitude and longitude, both in DMS form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPosition {
    pub latitude: DmsAngle,
    pub longitude: DmsAngle,
}

impl GpsPosition {
    pub fn new(latitude: DmsAngle, longitude: DmsAngle) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn from_decimal(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: DmsAngle::from_decimal(latitude, Axis::Latitude),
            longitude: DmsAngle::from_decimal(longitude, Axis::Longitude),
        }
    }

    /// Decimal (latitude, longitude) pair.
    pub fn decimal(&self) -> (f64, f64) {
        (self.latitude.to_decimal(), self.longitude.to_decimal())
    }
}

/// Great-circle distance between two positions, in kilometers.
pub fn distance_km(a: &GpsPosition, b: &GpsPosition) -> f64 {
    let (lat_a, long_a) = a.decimal();
    let (lat_b, long_b) = b.decimal();
    let from = Location::new(lat_a, long_a);
    let to = Location::new(lat_b, long_b);
    from.haversine_distance_to(&to).meters() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_dms_round_trip_north_east() {
        let original = 41.39025;
        let dms = DmsAngle::from_decimal(original, Axis::Latitude);
        assert_eq!(dms.hemisphere, Hemisphere::North);
        assert!((dms.to_decimal() - original).abs() < 1e-6);
    }

    #[test]
    fn test_decimal_dms_round_trip_south_west() {
        let lat = DmsAngle::from_decimal(-33.865143, Axis::Latitude);
        assert_eq!(lat.hemisphere, Hemisphere::South);
        assert!((lat.to_decimal() - (-33.865143)).abs() < 1e-6);

        let long = DmsAngle::from_decimal(-70.6483, Axis::Longitude);
        assert_eq!(long.hemisphere, Hemisphere::West);
        assert!((long.to_decimal() - (-70.6483)).abs() < 1e-6);
    }

    #[test]
    fn test_from_decimal_splits_units() {
        // 41.5 degrees is exactly 41 degrees 30 minutes
        let dms = DmsAngle::from_decimal(41.5, Axis::Latitude);
        assert_eq!(dms.degrees, 41);
        assert_eq!(dms.minutes, 30);
        assert!(dms.seconds.abs() < 1e-9);
    }

    #[test]
    fn test_display_parse_round_trip() {
        let dms = DmsAngle::new(2, 10, 26.5, Hemisphere::East);
        let text = dms.to_string();
        assert_eq!(text, "2°10'26.500\"E");

        let parsed: DmsAngle = text.parse().unwrap();
        assert_eq!(parsed.degrees, 2);
        assert_eq!(parsed.minutes, 10);
        assert!((parsed.seconds - 26.5).abs() < 1e-9);
        assert_eq!(parsed.hemisphere, Hemisphere::East);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("not an angle".parse::<DmsAngle>().is_err());
        assert!("12°70'0.0\"N".parse::<DmsAngle>().is_err());
        assert!("12°10'0.0\"Q".parse::<DmsAngle>().is_err());
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let p = GpsPosition::from_decimal(48.8566, 2.3522);
        assert!(distance_km(&p, &p) < 1e-6);
    }

    #[test]
    fn test_distance_paris_london() {
        let paris = GpsPosition::from_decimal(48.8566, 2.3522);
        let london = GpsPosition::from_decimal(51.5074, -0.1278);
        let d = distance_km(&paris, &london);
        assert!(d > 330.0 && d < 350.0, "unexpected distance {d}");
    }
}
