//! Jittered exponential backoff shared by the copy engine's part retries
//! (C2) and the delete engine's retries (C3), plus the cancellation-racing
//! helper both engines use at every suspension point (§5).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Computes the backoff delay before retry attempt `attempt` (1-based: the
/// delay before the *second* overall try is `attempt = 1`), starting from
/// `initial_backoff` and doubling each attempt, jittered by `±jitter`
/// (e.g. `0.2` for ±20%, matching §4.2 step 4e's "200 ms, 400 ms (±20%)").
pub fn backoff_delay(initial_backoff: Duration, attempt: u32, jitter: f64) -> Duration {
    let base = initial_backoff.saturating_mul(1u32 << attempt.min(20));
    let jitter = jitter.clamp(0.0, 1.0);
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

/// Races `fut` against `cancel`, so a suspension point that can legitimately
/// run for the adapter's whole per-request timeout (§5) is abandoned the
/// moment preemption is signaled rather than run to completion. `on_cancel`
/// builds the error returned when `cancel` wins the race.
pub async fn cancellable<T, E>(
    fut: impl Future<Output = Result<T, E>>,
    cancel: &CancellationToken,
    on_cancel: impl FnOnce() -> E,
) -> Result<T, E> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(on_cancel()),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_is_roughly_initial_backoff() {
        let d = backoff_delay(Duration::from_millis(200), 0, 0.2);
        assert!(d.as_millis() >= 160 && d.as_millis() <= 240);
    }

    #[test]
    fn second_retry_roughly_doubles() {
        let d = backoff_delay(Duration::from_millis(200), 1, 0.2);
        assert!(d.as_millis() >= 320 && d.as_millis() <= 480);
    }

    #[test]
    fn zero_jitter_is_exact() {
        let d = backoff_delay(Duration::from_millis(200), 2, 0.0);
        assert_eq!(d, Duration::from_millis(800));
    }
}
