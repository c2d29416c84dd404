//! Time helpers: staleness math against the source timezone and
//! randomized delays between requests.

use std::time::Duration;

use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use tracing::debug;

/// Whole days elapsed since `timestamp` (`YYYY-MM-DD HH:MM:SS`, UTC+8).
///
/// Returns `None` when the timestamp cannot be parsed; callers treat that
/// as stale.
pub fn days_since_update(timestamp: &str) -> Option<i64> {
    let tz = FixedOffset::east_opt(8 * 3600)?;
    let naive = NaiveDateTime::parse_from_str(timestamp.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let updated = tz.from_local_datetime(&naive).single()?;
    Some((Utc::now() - updated.with_timezone(&Utc)).num_days())
}

/// Sleep for a random duration in `[base, base * mul_spread]`, capped at
/// `max_sleep`.
///
/// Every delay in the pipeline goes through here so that retries across
/// workers never synchronize.
pub async fn sleep_with_random_delay(base: f64, mul_spread: f64, max_sleep: f64) {
    if base < 0.0 {
        debug!(base, "ignoring negative sleep");
        return;
    }
    let upper = (base * mul_spread.max(1.0)).max(base);
    let mut duration = if upper > base {
        rand::thread_rng().gen_range(base..upper)
    } else {
        base
    };
    duration = duration.min(max_sleep).max(0.0);
    tokio::time::sleep(Duration::from_secs_f64(duration)).await;
}
