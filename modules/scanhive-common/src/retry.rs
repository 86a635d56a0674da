use std::future::Future;
use std::time::Duration;

/// Retries a transient operation with bounded exponential backoff
/// (`base * 2^attempt`, capped at `max_attempts`). `is_transient` decides
/// whether a given error is worth retrying at all; a non-transient error
/// (or the final attempt) returns immediately.
pub async fn with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base: Duration,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < max_attempts && is_transient(&err) => {
                let backoff = base * 2u32.pow(attempt);
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(
            5,
            Duration::from_millis(1),
            |_: &&str| true,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_on_non_transient_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(
            5,
            Duration::from_millis(1),
            |_: &&str| false,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
        )
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<&str, &str> = with_backoff(
            3,
            Duration::from_millis(1),
            |_: &&str| true,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("transient") }
            },
        )
        .await;
        assert_eq!(result, Err("transient"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
