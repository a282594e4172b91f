//! Hour buckets, the archive naming grammar, and rotation/retention decisions.
//!
//! Rotation state is reconstructed from directory contents alone: archives are
//! recognized purely by name (`<LEVEL>.log.<YYYYMMDDHH>`) and never tracked in
//! memory. Names that do not match the grammar are ignored; names that match
//! the shape but carry an impossible date are the caller's to report.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::level::{Level, LOG_FILE_SUFFIX};

/// Hour-bucket suffix layout, e.g. `2019061012` for 2019-06-10 12:00 UTC.
const HOUR_SUFFIX_LEN: usize = 10;

/// Truncate `t` to its hour bucket (minutes, seconds, sub-seconds zeroed).
pub(crate) fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0)
        .expect("hour boundary of a valid timestamp is representable")
}

/// Format an hour bucket as the 10-digit archive suffix.
pub(crate) fn format_hour_suffix(bucket: DateTime<Utc>) -> String {
    bucket.format("%Y%m%d%H").to_string()
}

/// Parse a 10-digit archive suffix back into its hour bucket.
///
/// Returns `None` for suffixes that pass the shape check but carry impossible
/// date components (a 13th month, hour 27, ...).
pub(crate) fn parse_hour_suffix(suffix: &str) -> Option<DateTime<Utc>> {
    if suffix.len() != HOUR_SUFFIX_LEN {
        return None;
    }
    let date = NaiveDate::parse_from_str(&suffix[..8], "%Y%m%d").ok()?;
    let hour: u32 = suffix[8..].parse().ok()?;
    Some(date.and_hms_opt(hour, 0, 0)?.and_utc())
}

/// Match `name` against the archive grammar for any level.
///
/// Returns the level and the raw suffix when `name` is exactly
/// `<LEVEL>.log.` followed by 10 ASCII digits; anything else is not an
/// archive and yields `None`.
pub(crate) fn match_archive(name: &str) -> Option<(Level, &str)> {
    Level::ALL.iter().find_map(|&level| {
        let suffix = name
            .strip_prefix(level.as_str())?
            .strip_prefix(LOG_FILE_SUFFIX)?
            .strip_prefix('.')?;
        let shaped = suffix.len() == HOUR_SUFFIX_LEN && suffix.bytes().all(|b| b.is_ascii_digit());
        shaped.then_some((level, suffix))
    })
}

/// Rotation and retention state, mutated only under the backend lock.
#[derive(Debug)]
pub(crate) struct RotationPolicy {
    enabled: bool,
    keep_hours: i64,
    last_rotate_unix: i64,
}

impl RotationPolicy {
    pub fn new(enabled: bool, keep_hours: i64, now: DateTime<Utc>) -> Self {
        let mut policy = Self {
            enabled: false,
            keep_hours: 0,
            last_rotate_unix: 0,
        };
        policy.configure(enabled, keep_hours, now);
        policy
    }

    /// Enable or disable hourly rotation.
    ///
    /// Enabling seeds the last-rotation bucket to the current hour so the next
    /// rotate check does not fire spuriously; disabling resets it.
    pub fn configure(&mut self, enabled: bool, keep_hours: i64, now: DateTime<Utc>) {
        self.enabled = enabled;
        if enabled {
            self.keep_hours = keep_hours;
            self.last_rotate_unix = truncate_to_hour(now).timestamp();
        } else {
            self.last_rotate_unix = 0;
        }
    }

    /// The hour bucket to seal archives into, if this tick must rotate.
    pub fn due_bucket(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        let bucket = truncate_to_hour(now);
        (bucket.timestamp() > self.last_rotate_unix).then_some(bucket)
    }

    /// Record that active files were renamed into `bucket`.
    pub fn mark_rotated(&mut self, bucket: DateTime<Utc>) {
        self.last_rotate_unix = bucket.timestamp();
    }

    /// Whether the retention sweep should run at all.
    pub fn sweeps(&self) -> bool {
        self.enabled && self.keep_hours > 0
    }

    /// Whether an archive sealed at `sealed` has aged out by `now`.
    pub fn expired(&self, sealed: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.keep_hours <= 0 {
            return false;
        }
        sealed + Duration::hours(self.keep_hours) <= truncate_to_hour(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_truncate_to_hour_zeroes_sub_hour_components() {
        let edge = utc(2019, 1, 2, 12, 0, 0);
        assert_eq!(truncate_to_hour(utc(2019, 1, 2, 12, 13, 0)), edge);
        assert_eq!(truncate_to_hour(utc(2019, 1, 2, 12, 59, 59)), edge);
        assert_eq!(truncate_to_hour(edge), edge);
    }

    #[test]
    fn test_truncate_to_hour_is_idempotent() {
        let t = utc(2023, 11, 5, 7, 42, 17);
        assert_eq!(truncate_to_hour(truncate_to_hour(t)), truncate_to_hour(t));
    }

    #[test]
    fn test_hour_suffix_round_trip() {
        let bucket = utc(2019, 6, 10, 12, 0, 0);
        let suffix = format_hour_suffix(bucket);
        assert_eq!(suffix, "2019061012");
        assert_eq!(parse_hour_suffix(&suffix), Some(bucket));
    }

    #[test]
    fn test_suffix_is_zero_padded() {
        assert_eq!(format_hour_suffix(utc(2021, 3, 4, 5, 0, 0)), "2021030405");
    }

    #[test]
    fn test_parse_hour_suffix_rejects_impossible_dates() {
        assert_eq!(parse_hour_suffix("2019139912"), None); // month 13
        assert_eq!(parse_hour_suffix("2019061027"), None); // hour 27
        assert_eq!(parse_hour_suffix("201906101"), None); // too short
    }

    #[test]
    fn test_match_archive() {
        assert_eq!(
            match_archive("DEBUG.log.2019061012"),
            Some((Level::Debug, "2019061012"))
        );
        assert_eq!(
            match_archive("WARNING.log.2021030405"),
            Some((Level::Warning, "2021030405"))
        );
        // Active files, foreign files and malformed shapes are not archives.
        assert_eq!(match_archive("DEBUG.log"), None);
        assert_eq!(match_archive("DEBUG.log.2019x61012"), None);
        assert_eq!(match_archive("DEBUG.log.2019061012.bak"), None);
        assert_eq!(match_archive("TRACE.log.2019061012"), None);
        assert_eq!(match_archive("notes.txt"), None);
    }

    #[test]
    fn test_due_bucket_only_fires_on_a_new_hour() {
        let start = utc(2019, 7, 10, 1, 13, 14);
        let policy = RotationPolicy::new(true, 1, start);

        assert_eq!(policy.due_bucket(start), None);
        assert_eq!(policy.due_bucket(utc(2019, 7, 10, 1, 59, 59)), None);
        assert_eq!(
            policy.due_bucket(utc(2019, 7, 10, 2, 13, 14)),
            Some(utc(2019, 7, 10, 2, 0, 0))
        );
    }

    #[test]
    fn test_due_bucket_disabled() {
        let start = utc(2019, 7, 10, 1, 13, 14);
        let policy = RotationPolicy::new(false, 1, start);
        assert_eq!(policy.due_bucket(utc(2019, 7, 10, 9, 0, 0)), None);
    }

    #[test]
    fn test_mark_rotated_suppresses_refiring() {
        let start = utc(2019, 7, 10, 1, 13, 14);
        let mut policy = RotationPolicy::new(true, 1, start);

        let later = utc(2019, 7, 10, 2, 13, 14);
        let bucket = policy.due_bucket(later).unwrap();
        policy.mark_rotated(bucket);
        assert_eq!(policy.due_bucket(later), None);
    }

    #[test]
    fn test_expired_honors_keep_hours() {
        let sealed = utc(2019, 1, 2, 3, 0, 0);
        let now = utc(2019, 1, 2, 5, 4, 0);

        let policy = RotationPolicy::new(true, 1, now);
        assert!(policy.expired(sealed, now)); // 03:00 + 1h <= 05:00

        let policy = RotationPolicy::new(true, 3, now);
        assert!(!policy.expired(sealed, now)); // 03:00 + 3h > 05:00
    }

    #[test]
    fn test_retention_is_opt_in() {
        let sealed = utc(2000, 1, 1, 0, 0, 0);
        let now = utc(2019, 1, 2, 5, 4, 0);

        let policy = RotationPolicy::new(true, 0, now);
        assert!(!policy.sweeps());
        assert!(!policy.expired(sealed, now));

        let policy = RotationPolicy::new(true, -4, now);
        assert!(!policy.sweeps());
        assert!(!policy.expired(sealed, now));
    }
}
