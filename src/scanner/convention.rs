//! Capture dates encoded in filenames.
//!
//! Messaging apps strip EXIF but keep the capture date in the filename
//! (`IMG-20200114-WA0002.jpg`). These helpers recover that date so such
//! photos can be restamped and location-matched.

use chrono::{NaiveDate, NaiveDateTime};
use regex::{Regex, RegexBuilder};

/// Build the capture-convention matcher for the given extension filters.
/// Matches `IMG-YYYYMMDD-WAnnnn.<ext>`, case-insensitive.
pub fn capture_pattern(extensions: &[String]) -> Regex {
    let alternatives = extensions
        .iter()
        .map(|e| regex::escape(e))
        .collect::<Vec<_>>()
        .join("|");

    let pattern = format!(r"IMG-(\d{{8}})-WA\d{{4}}\.({alternatives})$");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .expect("escaped extension alternatives always form a valid pattern")
}

/// Extract the capture date from a convention-named file, at midnight. `None`
/// when the name does not match or the digits are not a real date.
pub fn datetime_from_filename(pattern: &Regex, filename: &str) -> Option<NaiveDateTime> {
    let captures = pattern.captures(filename)?;
    let digits = captures.get(1)?.as_str();

    NaiveDate::parse_from_str(digits, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
