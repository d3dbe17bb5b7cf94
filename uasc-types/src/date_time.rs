// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DateTime`.

use std::{
    fmt,
    io::{Read, Write},
    ops::{Add, Sub},
    str::FromStr,
};

use chrono::{Duration, TimeZone, Utc};

use crate::encoding::*;

const NANOS_PER_TICK: i64 = 100;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Minimum date time, the epoch of the OPC UA time format, 1601-01-01.
const MIN_YEAR: i32 = 1601;
/// Maximum date in the OPC UA time format, after which the value saturates.
const MAX_YEAR: i32 = 9999;

/// A date/time value. Underlying representation is the OPC UA wire format, a
/// 64-bit signed count of 100 nanosecond ticks since 1601-01-01 00:00:00 UTC,
/// clamped to the range `[1601-01-01, 9999-12-31]`.
#[derive(PartialEq, PartialOrd, Ord, Eq, Clone, Copy, Hash)]
pub struct DateTime {
    date_time: chrono::DateTime<Utc>,
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_time.to_rfc3339())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_time.to_rfc3339())
    }
}

impl SimpleBinaryEncodable for DateTime {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_i64(stream, self.checked_ticks())
    }
}

impl SimpleBinaryDecodable for DateTime {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let ticks = read_i64(stream)?;
        Ok(DateTime::from_ticks(ticks))
    }
}

impl Default for DateTime {
    fn default() -> Self {
        DateTime::null()
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(date_time: chrono::DateTime<Utc>) -> Self {
        // Clamp to the representable range and truncate to tick precision
        let min = epoch();
        let max = endtimes();
        let date_time = date_time.clamp(min, max);
        let nanos = date_time.timestamp_subsec_nanos() as i64 / NANOS_PER_TICK * NANOS_PER_TICK;
        let date_time = Utc
            .timestamp_opt(date_time.timestamp(), nanos as u32)
            .unwrap();
        DateTime { date_time }
    }
}

impl From<DateTime> for chrono::DateTime<Utc> {
    fn from(value: DateTime) -> Self {
        value.date_time
    }
}

impl FromStr for DateTime {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|v| Self::from(v.with_timezone(&Utc)))
            .map_err(|_| ())
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, other: Duration) -> DateTime {
        DateTime::from(self.date_time + other)
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, other: Duration) -> DateTime {
        DateTime::from(self.date_time - other)
    }
}

impl Sub<DateTime> for DateTime {
    type Output = Duration;

    fn sub(self, other: DateTime) -> Duration {
        self.date_time - other.date_time
    }
}

fn epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(MIN_YEAR, 1, 1, 0, 0, 0).unwrap()
}

fn endtimes() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(MAX_YEAR, 12, 31, 23, 59, 59).unwrap()
}

impl DateTime {
    /// The current time in UTC at tick precision.
    pub fn now() -> DateTime {
        DateTime::from(Utc::now())
    }

    /// The null date time, which encodes as tick count 0.
    pub fn null() -> DateTime {
        DateTime::from(epoch())
    }

    /// Construct from a number of ticks since 1601-01-01. Out of range values
    /// clamp to the representable range.
    pub fn from_ticks(ticks: i64) -> DateTime {
        let secs = ticks / TICKS_PER_SECOND;
        let nanos = (ticks % TICKS_PER_SECOND) * NANOS_PER_TICK;
        DateTime::from(match epoch().checked_add_signed(
            Duration::seconds(secs) + Duration::nanoseconds(nanos),
        ) {
            Some(d) => d,
            // Saturate rather than fail, matching the clamping on the way in
            None => endtimes(),
        })
    }

    /// The tick count for this date time.
    pub fn ticks(&self) -> i64 {
        let delta = self.date_time - epoch();
        delta.num_seconds() * TICKS_PER_SECOND
            + delta.subsec_nanos() as i64 / NANOS_PER_TICK
    }

    /// The tick count, with the null value and end of times mapped to the
    /// values Part 6 requires (0 and i64::MAX).
    pub fn checked_ticks(&self) -> i64 {
        let ticks = self.ticks();
        if ticks <= 0 {
            return 0;
        }
        if self.date_time >= endtimes() {
            return i64::MAX;
        }
        ticks
    }

    /// Test if this is the null date time.
    pub fn is_null(&self) -> bool {
        self.checked_ticks() == 0
    }

    /// Access the underlying chrono value.
    pub fn as_chrono(&self) -> &chrono::DateTime<Utc> {
        &self.date_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_zero() {
        assert_eq!(DateTime::null().checked_ticks(), 0);
        assert!(DateTime::null().is_null());
    }

    #[test]
    fn ticks_round_trip() {
        let now = DateTime::now();
        let ticks = now.ticks();
        assert_eq!(DateTime::from_ticks(ticks), now);
    }

    #[test]
    fn encodes_as_int64() {
        let now = DateTime::now();
        let bytes = SimpleBinaryEncodable::encode_to_vec(&now);
        assert_eq!(bytes.len(), 8);
        let mut stream = std::io::Cursor::new(bytes);
        let decoded =
            <DateTime as SimpleBinaryDecodable>::decode(&mut stream, &DecodingOptions::test())
                .unwrap();
        assert_eq!(decoded, now);
    }

    #[test]
    fn clamps_to_range() {
        let before_epoch = DateTime::from(Utc.with_ymd_and_hms(1500, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(before_epoch.checked_ticks(), 0);
    }
}
