//! Parsing and canonical formatting of the timestamps stored in the transaction table.
//!
//! Clients may send any of the common ISO-8601 shapes (with or without seconds,
//! fractional seconds, a UTC offset, or just a date). Everything is normalised
//! to a single fixed-width text form, [CANONICAL_FORMAT], which is what gets
//! stored in SQLite, bound as a query parameter, and written to JSON. Because
//! every stored value has the same width, comparing the text is the same as
//! comparing the instants.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{
    Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset,
    format_description::{BorrowedFormatItem, well_known::Rfc3339},
    macros::format_description,
};

/// The fixed-width form used for storage, bind parameters and JSON output.
pub const CANONICAL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]");

/// Local (offset-free) date-time shapes accepted from clients and CSV files.
const LOCAL_FORMATS: [&[BorrowedFormatItem<'static>]; 6] = [
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
];

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// The text could not be read as an ISO-8601 date or date-time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("\"{0}\" is not an ISO-8601 date-time")]
pub struct TimestampError(pub String);

/// A point in time without an offset, interpreted as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    /// Wrap a date-time that is already in UTC.
    pub fn new(date_time: PrimitiveDateTime) -> Self {
        Self(date_time)
    }

    /// The wrapped date-time.
    pub fn date_time(&self) -> PrimitiveDateTime {
        self.0
    }

    /// Parse any accepted ISO-8601 shape.
    ///
    /// Values carrying an offset (e.g. `2024-05-01T10:00:00+12:00` or a trailing `Z`)
    /// are converted to UTC. A bare date means midnight at the start of that day.
    ///
    /// # Errors
    /// Returns [TimestampError] if `text` matches none of the accepted shapes,
    /// or if converting it to UTC leaves the supported range of years.
    pub fn parse(text: &str) -> Result<Self, TimestampError> {
        let trimmed = text.trim();

        if let Ok(date_time) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            let utc = date_time
                .checked_to_offset(UtcOffset::UTC)
                .ok_or_else(|| TimestampError(text.to_owned()))?;
            return Ok(Self(PrimitiveDateTime::new(utc.date(), utc.time())));
        }

        for format in LOCAL_FORMATS {
            if let Ok(date_time) = PrimitiveDateTime::parse(trimmed, format) {
                return Ok(Self(date_time));
            }
        }

        Date::parse(trimmed, DATE_FORMAT)
            .map(|date| Self(date.midnight()))
            .map_err(|_| TimestampError(text.to_owned()))
    }

    /// The earliest instant with whole microseconds that is not before `self`.
    ///
    /// The canonical form drops everything below a microsecond, so a lower
    /// bound must be rounded up before it is formatted or it would admit
    /// values just before it. Returns `None` if rounding up overflows the
    /// supported range.
    pub fn round_up_to_micros(self) -> Option<Self> {
        let sub_micros = self.0.nanosecond() % 1_000;
        if sub_micros == 0 {
            return Some(self);
        }

        self.0
            .checked_add(Duration::nanoseconds(i64::from(1_000 - sub_micros)))
            .map(Self)
    }
}

impl From<PrimitiveDateTime> for Timestamp {
    fn from(value: PrimitiveDateTime) -> Self {
        Self(value)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Formatting a PrimitiveDateTime with a static description only fails on
        // years outside 0..=9999, which cannot be parsed in the first place.
        let text = self.0.format(CANONICAL_FORMAT).map_err(|_| std::fmt::Error)?;
        f.write_str(&text)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::{Timestamp, TimestampError};

    #[test]
    fn parses_minutes_precision() {
        let got = Timestamp::parse("2024-05-01T00:00").unwrap();

        assert_eq!(got, Timestamp::new(datetime!(2024-05-01 00:00)));
    }

    #[test]
    fn parses_seconds_and_fractions() {
        assert_eq!(
            Timestamp::parse("2024-05-01T10:20:30").unwrap(),
            Timestamp::new(datetime!(2024-05-01 10:20:30))
        );
        assert_eq!(
            Timestamp::parse("2024-05-01 10:20:30.25").unwrap(),
            Timestamp::new(datetime!(2024-05-01 10:20:30.25))
        );
    }

    #[test]
    fn converts_offsets_to_utc() {
        let got = Timestamp::parse("2024-05-01T10:00:00+02:00").unwrap();
        assert_eq!(got, Timestamp::new(datetime!(2024-05-01 08:00)));

        let got = Timestamp::parse("2024-05-01T10:00:00.000Z").unwrap();
        assert_eq!(got, Timestamp::new(datetime!(2024-05-01 10:00)));
    }

    #[test]
    fn bare_date_is_midnight() {
        let got = Timestamp::parse("2024-12-31").unwrap();

        assert_eq!(got, Timestamp::new(datetime!(2024-12-31 00:00)));
    }

    #[test]
    fn rejects_sql_metacharacters() {
        let input = "2024-01-01'; DROP TABLE transaction; --";

        assert_eq!(
            Timestamp::parse(input),
            Err(TimestampError(input.to_owned()))
        );
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(Timestamp::parse("2024-02-30T00:00").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn offset_pushing_past_last_year_is_rejected() {
        let input = "9999-12-31T23:59:59-01:00";

        assert_eq!(
            Timestamp::parse(input),
            Err(TimestampError(input.to_owned()))
        );
    }

    #[test]
    fn round_up_to_micros_only_moves_sub_microsecond_values() {
        let whole = Timestamp::new(datetime!(2024-01-01 00:00:00.000001));
        let fraction = Timestamp::new(datetime!(2024-01-01 00:00:00.0000009));

        assert_eq!(whole.round_up_to_micros(), Some(whole));
        assert_eq!(
            fraction.round_up_to_micros(),
            Some(Timestamp::new(datetime!(2024-01-01 00:00:00.000001)))
        );
        assert_eq!(
            Timestamp::new(datetime!(9999-12-31 23:59:59.9999995)).round_up_to_micros(),
            None
        );
    }

    #[test]
    fn canonical_form_is_fixed_width() {
        let early = Timestamp::new(datetime!(2024-01-01 00:00));
        let late = Timestamp::new(datetime!(2024-01-01 00:00:00.5));

        assert_eq!(early.to_string(), "2024-01-01T00:00:00.000000");
        assert_eq!(late.to_string(), "2024-01-01T00:00:00.500000");
        assert!(early.to_string() < late.to_string());
    }

    #[test]
    fn canonical_form_parses_back() {
        let want = Timestamp::new(datetime!(2023-07-14 09:08:07.654321));

        assert_eq!(Timestamp::parse(&want.to_string()).unwrap(), want);
    }

    #[test]
    fn serializes_as_canonical_string() {
        let timestamp = Timestamp::new(datetime!(2024-06-01 12:00));

        let got = serde_json::to_string(&timestamp).unwrap();

        assert_eq!(got, "\"2024-06-01T12:00:00.000000\"");
    }
}
