// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Time bucket encoding.
//!
//! Buckets are decimal calendar encodings in UTC, so they sort numerically:
//!
//! | granularity | layout         | example        |
//! |-------------|----------------|----------------|
//! | minute      | `yyyyMMddHHmm` | `202401151030` |
//! | hour        | `yyyyMMddHH`   | `2024011510`   |
//! | day         | `yyyyMMdd`     | `20240115`     |
//! | month       | `yyyyMM`       | `202401`       |

use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime, Time};

use crate::errors::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }

    // Number of trailing decimal digits this granularity keeps below the year.
    fn digits(self) -> u32 {
        match self {
            Granularity::Minute => 8,
            Granularity::Hour => 6,
            Granularity::Day => 4,
            Granularity::Month => 2,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truncates a wall-clock timestamp into a bucket of the given granularity.
pub fn bucket(timestamp_millis: i64, granularity: Granularity) -> Result<i64, RecordError> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_millis) * 1_000_000)
        .map_err(|_| RecordError::InvalidTimestamp(timestamp_millis))?;
    let minute = i64::from(dt.year()) * 100_000_000
        + i64::from(u8::from(dt.month())) * 1_000_000
        + i64::from(dt.day()) * 10_000
        + i64::from(dt.hour()) * 100
        + i64::from(dt.minute());
    convert(minute, Granularity::Minute, granularity)
}

/// Minute bucket for a timestamp: `floor(ts / 60000)` rendered as `yyyyMMddHHmm`.
pub fn minute_bucket(timestamp_millis: i64) -> Result<i64, RecordError> {
    bucket(timestamp_millis, Granularity::Minute)
}

/// Converts a bucket to a coarser (or equal) granularity.
pub fn convert(bucket: i64, from: Granularity, to: Granularity) -> Result<i64, RecordError> {
    if to < from {
        return Err(RecordError::Granularity {
            from: from.as_str(),
            to: to.as_str(),
        });
    }
    Ok(bucket / 10_i64.pow(from.digits() - to.digits()))
}

/// Epoch millis of the first instant covered by `bucket`.
pub fn start_millis(bucket: i64, granularity: Granularity) -> Result<i64, RecordError> {
    let invalid = || RecordError::InvalidTimeBucket(bucket);
    // Pad to minute layout so every granularity parses the same way.
    let padded = match granularity {
        Granularity::Minute => Some(bucket),
        Granularity::Hour => bucket.checked_mul(100),
        Granularity::Day => bucket.checked_mul(10_000),
        Granularity::Month => bucket
            .checked_mul(1_000_000)
            .and_then(|b| b.checked_add(10_000)),
    }
    .ok_or_else(invalid)?;
    let year = i32::try_from(padded / 100_000_000).map_err(|_| invalid())?;
    let month = u8::try_from(padded / 1_000_000 % 100).map_err(|_| invalid())?;
    let day = u8::try_from(padded / 10_000 % 100).map_err(|_| invalid())?;
    let hour = u8::try_from(padded / 100 % 100).map_err(|_| invalid())?;
    let minute = u8::try_from(padded % 100).map_err(|_| invalid())?;

    let month = Month::try_from(month).map_err(|_| invalid())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
    let time = Time::from_hms(hour, minute, 0).map_err(|_| invalid())?;
    Ok(date.with_time(time).assume_utc().unix_timestamp() * 1000)
}
