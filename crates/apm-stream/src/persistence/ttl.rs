// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use time::{Date, Month, OffsetDateTime, Time};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::dao::HistoryCleaner;
use crate::errors::RecordError;
use crate::record::Granularity;

/// How long rows of each granularity are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlConfig {
    pub minute_minutes: i64,
    pub hour_hours: i64,
    pub day_days: i64,
    pub month_months: i64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            minute_minutes: 90,
            hour_hours: 36,
            day_days: 45,
            month_months: 18,
        }
    }
}

impl TtlConfig {
    /// Epoch millis before which rows of `granularity` are expired at `now`.
    pub fn cutoff_millis(
        &self,
        granularity: Granularity,
        now: OffsetDateTime,
    ) -> Result<i64, RecordError> {
        let cutoff = match granularity {
            Granularity::Minute => now - time::Duration::minutes(self.minute_minutes),
            Granularity::Hour => now - time::Duration::hours(self.hour_hours),
            Granularity::Day => now - time::Duration::days(self.day_days),
            Granularity::Month => months_before(now, self.month_months)?,
        };
        Ok(millis(cutoff))
    }
}

fn millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Start of the month lying `months` calendar months before `now`'s month.
fn months_before(now: OffsetDateTime, months: i64) -> Result<OffsetDateTime, RecordError> {
    let invalid = || RecordError::InvalidTimestamp(millis(now));
    let total = i64::from(now.year()) * 12 + i64::from(u8::from(now.month())) - 1 - months;
    let year = i32::try_from(total.div_euclid(12)).map_err(|_| invalid())?;
    let month = u8::try_from(total.rem_euclid(12) + 1).map_err(|_| invalid())?;
    let month = Month::try_from(month).map_err(|_| invalid())?;
    let date = Date::from_calendar_date(year, month, 1).map_err(|_| invalid())?;
    Ok(date.with_time(Time::MIDNIGHT).assume_utc())
}

/// Periodically removes expired rows from every registered table.
#[derive(Default)]
pub struct HistoryDeleter {
    ttl: TtlConfig,
    tables: Vec<(String, Granularity, Arc<dyn HistoryCleaner>)>,
}

impl HistoryDeleter {
    #[must_use]
    pub fn new(ttl: TtlConfig) -> Self {
        Self {
            ttl,
            tables: Vec::new(),
        }
    }

    pub fn register(&mut self, table: String, granularity: Granularity, cleaner: Arc<dyn HistoryCleaner>) {
        self.tables.push((table, granularity, cleaner));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Runs one deletion pass and returns the number of removed rows.
    /// Failures are logged per table.
    pub async fn run_once(&self, now: OffsetDateTime) -> usize {
        let mut removed = 0;
        for (table, granularity, cleaner) in &self.tables {
            let cutoff = match self.ttl.cutoff_millis(*granularity, now) {
                Ok(cutoff) => cutoff,
                Err(e) => {
                    error!(table = %table, "Failed to compute history cutoff: {e}");
                    continue;
                }
            };
            match cleaner.purge(0, cutoff).await {
                Ok(n) => removed += n,
                Err(e) => error!(table = %table, "Failed to delete history: {e}"),
            }
        }
        debug!("History deletion removed {removed} rows");
        removed
    }

    pub async fn run(self, every: Duration, cancel: CancellationToken) {
        info!("Deleting expired history every {}s across {} tables", every.as_secs(), self.tables.len());
        let mut ticker = interval(every);
        ticker.tick().await; // discard first tick, which is instantaneous
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once(OffsetDateTime::now_utc()).await;
                }
            }
        }
    }
}
