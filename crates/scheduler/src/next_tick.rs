//! Next-tick computation for schedule cron expressions.

use {
    chrono::{DateTime, TimeZone, Utc},
    cron::Schedule,
};

use crate::{Error, Result};

/// Compute the next tick time (epoch millis) after `now_ms`.
///
/// Accepts 5-field expressions (min hour dom month dow); the `cron` crate
/// wants 7 fields, so we pad seconds and year. Returns `None` when the
/// expression has no future firings.
pub fn next_tick(expr: &str, tz: Option<&str>, now_ms: u64) -> Result<Option<u64>> {
    let schedule: Schedule = expr.parse().or_else(|_| {
        let padded = format!("0 {expr} *");
        padded.parse::<Schedule>()
    })?;

    let now_dt = DateTime::from_timestamp_millis(now_ms as i64)
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());

    let next = if let Some(tz_name) = tz {
        let tz: chrono_tz::Tz = tz_name
            .parse()
            .map_err(|_| Error::unknown_timezone(tz_name))?;
        let now_local = now_dt.with_timezone(&tz);
        schedule
            .after(&now_local)
            .next()
            .map(|dt| dt.timestamp_millis() as u64)
    } else {
        schedule
            .after(&now_dt)
            .next()
            .map(|dt| dt.timestamp_millis() as u64)
    };

    Ok(next)
}
