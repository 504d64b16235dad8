//! Spatio-temporal grouping of photos into place visits.
//!
//! A single pass over the time-sorted records carries a rolling anchor: each
//! record is tested against the anchor for time and distance proximity, and a
//! new visit starts only when both tests fail. A photo far in space but taken
//! moments after the anchor still belongs to the same visit, and vice versa.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::coords::{distance_km, GpsPosition};
use crate::scanner::PhotoRecord;

/// What to do with a record whose proximity cannot be tested because it has
/// no GPS fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingGpsPolicy {
    /// Fold the record into the current group: absence of a test is treated
    /// as "not proven different", not as "different".
    #[default]
    IncludeInGroup,
    /// Leave the record out of every group and report it separately.
    ExcludeAndFlag,
}

/// An ordered, non-empty run of photos believed to share one place visit.
/// Records stay in non-decreasing capture-timestamp order; the first record
/// is the anchor the rest were tested against.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceGroup {
    pub records: Vec<PhotoRecord>,
}

impl PlaceGroup {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Grouper output: the visits, plus the records excluded under
/// [`MissingGpsPolicy::ExcludeAndFlag`].
#[derive(Debug, Default)]
pub struct Grouping {
    pub groups: Vec<PlaceGroup>,
    pub flagged: Vec<PhotoRecord>,
}

fn capture_time(record: &PhotoRecord) -> Result<NaiveDateTime> {
    record.captured_at.ok_or_else(|| Error::MissingTimestamp {
        filename: record.filename.clone(),
    })
}

/// Partition time-sorted records into place visits.
///
/// Precondition: `records` sorted ascending by capture timestamp. Any record
/// without a timestamp fails the whole pass before grouping begins. Output
/// preserves input order within and across groups.
pub fn group_by_visit(
    records: Vec<PhotoRecord>,
    max_distance_km: f64,
    max_time_sec: i64,
    policy: MissingGpsPolicy,
) -> Result<Grouping> {
    for record in &records {
        capture_time(record)?;
    }

    let mut groups: Vec<PlaceGroup> = Vec::new();
    let mut flagged: Vec<PhotoRecord> = Vec::new();
    let mut current: Vec<PhotoRecord> = Vec::new();
    let mut anchor: Option<(NaiveDateTime, Option<GpsPosition>)> = None;

    for record in records {
        let record_time = capture_time(&record)?;

        if record.position.is_none() {
            match policy {
                MissingGpsPolicy::ExcludeAndFlag => {
                    tracing::warn!(file = %record.filename, "no GPS fix, excluded and flagged");
                    flagged.push(record);
                    continue;
                }
                MissingGpsPolicy::IncludeInGroup => {
                    if anchor.is_some() {
                        tracing::warn!(file = %record.filename, "no GPS fix, folded into current group");
                        current.push(record);
                        continue;
                    }
                    // First record of the sequence: it anchors the first
                    // group below even without a fix.
                }
            }
        }

        let Some((anchor_time, anchor_pos)) = anchor else {
            anchor = Some((record_time, record.position));
            current.push(record);
            continue;
        };

        // An anchor without a fix only happens when the sequence opened with
        // a GPS-less record under IncludeInGroup; no test can run, so nothing
        // splits.
        let (Some(anchor_pos), Some(record_pos)) = (anchor_pos, record.position) else {
            current.push(record);
            continue;
        };

        let elapsed = (record_time - anchor_time).num_seconds();
        let within_time = elapsed <= max_time_sec;
        let distance = distance_km(&anchor_pos, &record_pos);
        let within_distance = distance < max_distance_km;

        if !within_distance && !within_time {
            tracing::debug!(
                file = %record.filename,
                distance_km = distance,
                elapsed_sec = elapsed,
                closed = current.len(),
                "visit boundary"
            );
            groups.push(PlaceGroup {
                records: std::mem::take(&mut current),
            });
            anchor = Some((record_time, record.position));
            current.push(record);
        } else {
            current.push(record);
        }
    }

    if !current.is_empty() {
        groups.push(PlaceGroup { records: current });
    }

    Ok(Grouping { groups, flagged })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::coords::GpsPosition;

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

    #[test]
    fn test_two_visits_from_three_photos() {
        // first two within 0.5 km and an hour, third 50 km away four hours on
        let records = vec![
            record("p1.jpg", "2020-06-01 10:00:00", Some((41.3900, 2.1500))),
            record("p2.jpg", "2020-06-01 10:05:00", Some((41.3910, 2.1500))),
            record("p3.jpg", "2020-06-01 14:00:00", Some((41.8400, 2.1500))),
        ];

        let grouping = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();

        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(grouping.groups[0].len(), 2);
        assert_eq!(grouping.groups[0].records[0].filename, "p1.jpg");
        assert_eq!(grouping.groups[0].records[1].filename, "p2.jpg");
        assert_eq!(grouping.groups[1].records[0].filename, "p3.jpg");
    }

    #[test]
    fn test_far_in_space_close_in_time_stays() {
        let records = vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15))),
            record("b.jpg", "2020-06-01 10:01:00", Some((41.84, 2.15))),
        ];

        let grouping = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();
        assert_eq!(grouping.groups.len(), 1);
    }

    #[test]
    fn test_close_in_space_far_in_time_stays() {
        let records = vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15))),
            record("b.jpg", "2020-06-03 18:00:00", Some((41.3901, 2.15))),
        ];

        let grouping = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();
        assert_eq!(grouping.groups.len(), 1);
    }

    #[test]
    fn test_anchor_resets_on_split() {
        // after the split at b, c is measured against b, not a
        let records = vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15))),
            record("b.jpg", "2020-06-01 16:00:00", Some((41.84, 2.15))),
            record("c.jpg", "2020-06-01 16:05:00", Some((41.8401, 2.15))),
        ];

        let grouping = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();

        assert_eq!(grouping.groups.len(), 2);
        assert_eq!(grouping.groups[0].len(), 1);
        assert_eq!(grouping.groups[1].len(), 2);
        assert_eq!(grouping.groups[1].records[0].filename, "b.jpg");
    }

    #[test]
    fn test_output_is_an_order_preserving_partition() {
        let records = vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15))),
            record("b.jpg", "2020-06-01 10:20:00", Some((41.391, 2.15))),
            record("c.jpg", "2020-06-02 09:00:00", Some((48.85, 2.35))),
            record("d.jpg", "2020-06-02 09:10:00", None),
            record("e.jpg", "2020-06-03 20:00:00", Some((41.39, 2.15))),
        ];
        let original = records.clone();

        let grouping =
            group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();

        let flattened: Vec<PhotoRecord> = grouping
            .groups
            .iter()
            .flat_map(|g| g.records.iter().cloned())
            .collect();
        assert_eq!(flattened, original);
        assert!(grouping.groups.iter().all(|g| !g.is_empty()));
        assert!(grouping.flagged.is_empty());
    }

    #[test]
    fn test_missing_timestamp_fails_whole_pass() {
        let mut bad = record("undated.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15)));
        bad.captured_at = None;
        let records = vec![
            bad,
            record("ok.jpg", "2020-06-01 10:01:00", Some((41.39, 2.15))),
        ];

        let err = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap_err();
        assert!(matches!(err, Error::MissingTimestamp { ref filename } if filename == "undated.jpg"));
    }

    #[test]
    fn test_missing_gps_folds_into_current_group() {
        let records = vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15))),
            record("nogps.jpg", "2020-06-01 10:01:00", None),
            record("b.jpg", "2020-06-01 10:02:00", Some((41.3901, 2.15))),
        ];

        let grouping = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();

        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].len(), 3);
    }

    #[test]
    fn test_missing_gps_excluded_when_flag_policy() {
        let records = vec![
            record("a.jpg", "2020-06-01 10:00:00", Some((41.39, 2.15))),
            record("nogps.jpg", "2020-06-01 10:01:00", None),
            record("b.jpg", "2020-06-01 10:02:00", Some((41.3901, 2.15))),
        ];

        let grouping = group_by_visit(records, 0.5, 3600, MissingGpsPolicy::ExcludeAndFlag).unwrap();

        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups[0].len(), 2);
        assert_eq!(grouping.flagged.len(), 1);
        assert_eq!(grouping.flagged[0].filename, "nogps.jpg");
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        let grouping = group_by_visit(vec![], 0.5, 3600, MissingGpsPolicy::IncludeInGroup).unwrap();
        assert!(grouping.groups.is_empty());
    }
}
