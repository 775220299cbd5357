use anyhow::{Context, Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T, E>(mut operation: F, retries: usize, delay_ms: u64) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<Error>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(Into::into) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Seconds from `now` until the next `hour:minute` UTC.
pub fn seconds_between(now: DateTime<Utc>, hour: u32, minute: u32) -> Result<u64> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .with_context(|| format!("Invalid refresh time {hour:02}:{minute:02}"))?;
    let mut target = now.date_naive().and_time(time).and_utc();
    if target <= now {
        target += ChronoDuration::days(1);
    }
    Ok((target - now).num_seconds().max(0) as u64)
}

/// Seconds until the next `hour:minute` UTC, used to expire cached market data
/// when the next daily close becomes available.
pub fn seconds_until(hour: u32, minute: u32) -> Result<u64> {
    seconds_between(Utc::now(), hour, minute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_seconds_between_same_day_and_next_day() {
        let morning = Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap();
        assert_eq!(seconds_between(morning, 22, 0).unwrap(), 14 * 3600);

        let late = Utc.with_ymd_and_hms(2024, 5, 10, 23, 30, 0).unwrap();
        assert_eq!(seconds_between(late, 22, 0).unwrap(), 22 * 3600 + 1800);

        let exact = Utc.with_ymd_and_hms(2024, 5, 10, 22, 0, 0).unwrap();
        assert_eq!(seconds_between(exact, 22, 0).unwrap(), 24 * 3600);

        assert!(seconds_between(morning, 25, 0).is_err());
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_retry(
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow::anyhow!("flaky"))
                } else {
                    Ok(7)
                }
            },
            3,
            1,
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), Error> = with_retry(
            || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("down"))
            },
            2,
            1,
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
