//! Snapshot version identifiers.
//!
//! Every compiled snapshot is tagged with the wall-clock time it was built
//! at and a monotonic counter, e.g. `2024-03-01T10:15:00Z-V7`. The counter
//! alone orders versions; the timestamp is for humans reading proxy admin
//! pages.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Version identifier of a snapshot.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use switchyard_core::SnapshotVersion;
///
/// let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
/// let version = SnapshotVersion::at(7, at);
/// assert_eq!(version.as_str(), "2024-03-01T10:15:00Z-V7");
/// assert_eq!(version.counter(), 7);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotVersion {
    counter: u64,
    label: String,
}

impl SnapshotVersion {
    /// Create a version for `counter` stamped with the current time.
    #[must_use]
    pub fn new(counter: u64) -> Self {
        Self::at(counter, Utc::now())
    }

    /// Create a version for `counter` stamped with `at`.
    #[must_use]
    pub fn at(counter: u64, at: DateTime<Utc>) -> Self {
        let label = format!(
            "{}-V{}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            counter
        );
        Self { counter, label }
    }

    /// Get the monotonic counter.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Get the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<SnapshotVersion> for String {
    fn from(v: SnapshotVersion) -> Self {
        v.label
    }
}

impl AsRef<str> for SnapshotVersion {
    fn as_ref(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_version_format() {
        let at = Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 58).unwrap();
        let v = SnapshotVersion::at(42, at);
        assert_eq!(v.as_str(), "2021-12-31T23:59:58Z-V42");
        assert_eq!(format!("{v}"), "2021-12-31T23:59:58Z-V42");
    }

    #[test]
    fn test_same_counter_different_time_differs() {
        let a = SnapshotVersion::at(1, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let b = SnapshotVersion::at(1, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap());
        assert_ne!(a, b);
        assert_eq!(a.counter(), b.counter());
    }

    #[test]
    fn test_new_ends_with_counter() {
        let v = SnapshotVersion::new(3);
        assert!(v.as_str().ends_with("-V3"));
        assert!(v.as_str().contains('T'));
    }
}
