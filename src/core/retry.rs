use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries an async operation a bounded number of times with a fixed delay
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `attempts`: Total number of runs, at least one
/// - `delay`: Pause between consecutive attempts
///
/// # Returns
/// The first successful result, or the last error together with the number of
/// attempts made
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    attempts: usize,
    delay: Duration,
) -> Result<T, (E, usize)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= attempts {
                    return Err((err, attempt));
                }
                warn!("Attempt {}/{} failed: {}. Retrying...", attempt, attempts, err);
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
