//! Cron - cron 式の評価
//!
//! # 学習ポイント
//! - `cron` crate の 6/7 フィールド形式（秒が先頭）
//! - 5 フィールド形式は先頭に秒 `0` を補う
//! - `chrono-tz` で IANA タイムゾーンに変換してから次の fire 時刻を求める

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ::cron::Schedule;

use crate::domain::SchedulerError;

/// A parsed cron expression bound to a timezone.
///
/// Accepts the `cron` crate syntax (seconds first, optional year). Classic
/// five-field expressions get a `0` seconds field prepended.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedule: Schedule,
    timezone: Tz,
}

impl CronSchedule {
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, SchedulerError> {
        let normalized = normalize(expression);
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expr: expression.to_string(),
                message: e.to_string(),
            })?;
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(timezone.to_string()))?;
        Ok(Self { schedule, timezone })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn normalize(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}
