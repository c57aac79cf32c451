// Retry with exponential backoff

use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Run `operation` until it succeeds or `max_retries` attempts have failed,
/// sleeping 2, 4, 8, 16, 32 (capped) seconds between attempts.
pub async fn with_retry<F, T, E>(
    mut operation: F,
    max_retries: u32,
) -> Result<T, E>
where
    F: FnMut() -> futures::future::BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(error);
                }

                let delay = backoff_delay(attempt);
                warn!(attempt, max_retries, "Attempt failed: {}; retrying in {:?}", error, delay);
                sleep(delay).await;
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt.min(MAX_BACKOFF_EXPONENT)))
}
