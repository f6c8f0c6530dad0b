//! Delete engine (C3): idempotent target-side deletion (§4.3).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::config::RetryPolicy;
use crate::error::{MirrorError, Result};
use crate::ports::TargetStore;
use crate::retry::{backoff_delay, cancellable};

/// Issues an unconditional delete against the target, retrying transient
/// failures up to `retry_policy.delete_retries` times. A target that
/// reports "not found" is expected to surface that as `Ok(())` at the
/// adapter boundary (§4.3), so this function treats any `Ok` from
/// [`TargetStore::delete`] as success without re-probing. Every suspension
/// point — the delete call itself and the backoff sleep between
/// attempts — is raced against `cancel` (§5), so a preempted worker never
/// waits out a delete's full per-request timeout before observing drain.
#[instrument(skip(target, retry_policy, cancel), fields(key = %key))]
pub async fn delete(
    target: &Arc<dyn TargetStore>,
    key: &str,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        let outcome = cancellable(target.delete(key), cancel, || MirrorError::DeleteFailed {
            key: key.to_string(),
            reason: "cancelled during delete call".to_string(),
        })
        .await;

        match outcome {
            Ok(()) => return Ok(()),
            Err(err) if attempt < retry_policy.delete_retries => {
                attempt += 1;
                warn!(key = %key, attempt, error = %err, "delete failed, retrying with backoff");
                let delay = backoff_delay(retry_policy.initial_backoff, attempt - 1, retry_policy.backoff_jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(MirrorError::DeleteFailed {
                            key: key.to_string(),
                            reason: "cancelled during delete retry backoff".to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                return Err(MirrorError::DeleteFailed {
                    key: key.to_string(),
                    reason: format!("exhausted retries: {err}"),
                });
            }
        }
    }
}
