//! Visibility keeper (C4): a background ticker that extends a queue
//! message's visibility deadline while C2/C3 work on it (§4.4).
//!
//! Lifetime discipline mirrors this codebase's background-worker handle
//! shape: a `oneshot` stop channel paired with a `JoinHandle`, torn down
//! explicitly via [`VisibilityKeeper::stop`] or, on any exit path that
//! skips that call (panic, early return, drain timeout), by `Drop`. A
//! leaked keeper would indefinitely extend a dead message (§9), so every
//! code path that starts one must own it until completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::VisibilityPolicy;
use crate::error::MirrorError;
use crate::model::Receipt;
use crate::ports::QueueClient;

/// RAII handle to one running visibility-extension ticker. A Worker
/// spawns exactly one of these per in-flight message (§4.4).
pub struct VisibilityKeeper {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
    lease_lost: Arc<AtomicBool>,
}

impl VisibilityKeeper {
    /// Starts extending `receipt`'s visibility every `extend_interval`, by
    /// `visibility_timeout`, until [`stop`](Self::stop) is called or this
    /// handle is dropped.
    pub fn start(
        queue: Arc<dyn QueueClient>,
        receipt: Receipt,
        policy: VisibilityPolicy,
    ) -> Self {
        let lease_lost = Arc::new(AtomicBool::new(false));
        let lease_lost_for_task = lease_lost.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            let extend_seconds = policy.visibility_timeout.as_secs().min(u64::from(u32::MAX)) as u32;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(policy.extend_interval) => {
                        match queue.extend(&receipt, extend_seconds).await {
                            Ok(()) => {
                                debug!(receipt = %receipt, "visibility extended");
                            }
                            Err(err @ MirrorError::LeaseLost(_)) => {
                                // §4.4: the queue reports the message itself
                                // is gone (not a transient error — the
                                // adapter already retried those). The
                                // in-flight work still runs to completion,
                                // but its ack is expected to fail and
                                // redrive takes over.
                                warn!(receipt = %receipt, error = %err, "lease lost, stopping visibility keeper");
                                lease_lost_for_task.store(true, Ordering::SeqCst);
                                break;
                            }
                            Err(err) => {
                                // A non-lease-loss failure (e.g. the queue
                                // exhausted its own bounded transient
                                // retries): stop extending, but do not
                                // claim the lease is lost — it may still
                                // be valid.
                                warn!(receipt = %receipt, error = %err, "extend failed, stopping visibility keeper");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
            lease_lost,
        }
    }

    /// Whether the keeper stopped itself because the lease was lost
    /// mid-flight, rather than because [`stop`](Self::stop) was called.
    pub fn lease_lost(&self) -> bool {
        self.lease_lost.load(Ordering::SeqCst)
    }

    /// Signals the keeper to stop and waits for its background task to
    /// finish. Always call this on the success/failure path so the
    /// extension loop does not outlive the message it guards.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.await;
        }
    }
}

impl Drop for VisibilityKeeper {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
