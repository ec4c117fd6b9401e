//! Version markers
//!
//! A [`Version`] identifies one revision of a logical document's source. It is
//! an ordered UTC timestamp; comparison is plain chronological order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Layouts tried when a timestamp carries no offset; read as UTC
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Ordered, comparable revision marker of a document source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(DateTime<Utc>);

impl Version {
    /// Wrap a UTC timestamp
    #[inline]
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Version from seconds since the Unix epoch
    ///
    /// # Errors
    /// Returns [`VersionParseError`] when the value is out of chrono's range.
    pub fn from_unix_seconds(secs: i64) -> Result<Self, VersionParseError> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(Self)
            .ok_or_else(|| VersionParseError::new(secs.to_string(), "timestamp out of range"))
    }

    /// Version taken from a filesystem modification time
    #[inline]
    #[must_use]
    pub fn from_system_time(at: SystemTime) -> Self {
        Self(DateTime::<Utc>::from(at))
    }

    /// Parse an RFC 3339 timestamp, accepting a trailing `Z`
    ///
    /// A timestamp without an offset (`2026-01-01T00:00:00` or
    /// `2026-01-01 00:00:00`) is taken as UTC.
    ///
    /// # Errors
    /// Returns [`VersionParseError`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, VersionParseError> {
        let trimmed = raw.trim();
        match DateTime::parse_from_rfc3339(trimmed) {
            Ok(at) => Ok(Self(at.with_timezone(&Utc))),
            Err(e) => NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|naive| Self(naive.and_utc()))
                .ok_or_else(|| VersionParseError::new(trimmed, e.to_string())),
        }
    }

    /// Underlying timestamp
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical RFC 3339 rendering (`2026-01-01T00:00:00Z`)
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_rfc3339()
    }
}

impl From<DateTime<Utc>> for Version {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

/// A version marker that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version marker '{raw}': {reason}")]
pub struct VersionParseError {
    /// Text that failed to parse
    pub raw: String,
    /// Parser message
    pub reason: String,
}

impl VersionParseError {
    fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zulu_suffix() {
        let v = Version::parse("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(v.to_string(), "2026-01-01T00:00:00Z");
    }

    #[test]
    fn normalizes_offsets_to_utc() {
        let v = Version::parse("2026-01-01T02:00:00+02:00").unwrap();
        assert_eq!(v, Version::parse("2026-01-01T00:00:00Z").unwrap());
    }

    #[test]
    fn keeps_subsecond_precision() {
        let v = Version::parse("2025-06-30T12:00:00.250Z").unwrap();
        assert_eq!(v.to_string(), "2025-06-30T12:00:00.250Z");
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let utc = Version::parse("2026-01-01T08:30:00Z").unwrap();
        assert_eq!(Version::parse("2026-01-01T08:30:00").unwrap(), utc);
        assert_eq!(Version::parse("2026-01-01 08:30:00").unwrap(), utc);
        assert_eq!(
            Version::parse("2026-01-01T08:30:00.5").unwrap().to_string(),
            "2026-01-01T08:30:00.500Z"
        );
        assert!(Version::parse("2026-01-01").is_err());
    }

    #[test]
    fn rejects_garbage() {
        let err = Version::parse("yesterday").unwrap_err();
        assert_eq!(err.raw, "yesterday");
    }

    #[test]
    fn orders_chronologically() {
        let older = Version::parse("2025-12-31T00:00:00Z").unwrap();
        let newer = Version::parse("2026-01-01T00:00:00Z").unwrap();
        assert!(older < newer);
    }

    #[test]
    fn unix_seconds() {
        let v = Version::from_unix_seconds(0).unwrap();
        assert_eq!(v.to_string(), "1970-01-01T00:00:00Z");
    }
}
