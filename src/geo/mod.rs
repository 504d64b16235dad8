//! Geo-inference pipeline: group geotagged photos into place visits, reduce
//! the visits to a durable location mapping table, and apply inferred
//! locations back onto photos that lack them.

pub mod applicator;
pub mod coords;
pub mod grouper;
pub mod location_map;

pub use applicator::{apply_to_photo, lookup, AppliedLocation, TimestampSource, WindowTieBreak};
pub use coords::{distance_km, Axis, DmsAngle, GpsPosition, Hemisphere};
pub use grouper::{group_by_visit, Grouping, MissingGpsPolicy, PlaceGroup};
pub use location_map::{read_location_map, summarize, write_location_map, LocationMapEntry};
