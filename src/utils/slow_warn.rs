use std::future::Future;
use std::time::{Duration, Instant};

use log::{Level, log_enabled, warn};

/// Awaits `future`, logging a warning once it has run past `threshold` and
/// another when it finally completes. The future is never cancelled.
///
/// `describe` is only called when the warning is actually emitted.
pub async fn warn_if_slow<F, T, M>(describe: &M, threshold: Duration, future: F) -> T
where
    F: Future<Output = T>,
    M: Fn() -> String,
{
    if !log_enabled!(Level::Warn) {
        return future.await;
    }

    let started = Instant::now();
    tokio::pin!(future);
    match tokio::time::timeout(threshold, &mut future).await {
        Ok(output) => output,
        Err(_) => {
            let what = describe();
            warn!("{what} still running after {:.1}s", threshold.as_secs_f32());
            let output = future.await;
            warn!("{what} finished after {:.1}s", started.elapsed().as_secs_f32());
            output
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_future_still_completes() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            42
        };
        let out = warn_if_slow(&|| "slow op".to_string(), Duration::from_secs(1), slow).await;
        assert_eq!(out, 42);
    }
}
