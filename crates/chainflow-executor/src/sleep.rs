//! Cancellable sleeps.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` if the full duration elapsed.
pub async fn cancellable_sleep(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Uniform random whole-second delay in `[min_secs, max_secs]`.
pub fn random_delay(min_secs: u64, max_secs: u64) -> Duration {
    use rand::Rng;

    if max_secs <= min_secs {
        return Duration::from_secs(min_secs);
    }
    Duration::from_secs(rand::thread_rng().gen_range(min_secs..=max_secs))
}
