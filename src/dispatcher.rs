//! Dispatcher (C6): a periodic, stateless scaling decision plus the
//! side-effecting launch call that acts on it (§4.6).
//!
//! The decision and the launch are deliberately two functions:
//! [`plan`] is a pure function of observed state, independently testable
//! from any compute-launcher side effect (§9 "Dispatcher statelessness",
//! §8 property 5); [`dispatch`] calls it once per tick and then launches.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DispatchPolicy;
use crate::error::Result;
use crate::model::{DispatchPlan, QueueDepth, WorkerCensus};
use crate::ports::ComputeLauncher;

/// Computes one Dispatcher tick's scaling decision without launching
/// anything. Scaling is up-only: a negative `desired − census` clamps to
/// zero, since workers are expected to self-exit on idle rather than be
/// told to stop.
pub fn plan(queue_depth: QueueDepth, census: WorkerCensus, policy: &DispatchPolicy) -> DispatchPlan {
    let backlog = queue_depth.total();
    let per_task = u64::from(policy.target_backlog_per_task.max(1));
    let raw_desired = backlog.div_ceil(per_task);
    let desired = raw_desired.min(u64::from(policy.max_workers)) as u32;

    let gap = desired.saturating_sub(census.total());
    let to_start = gap.min(policy.burst_start_limit);

    DispatchPlan {
        queue_depth,
        census,
        desired,
        to_start,
    }
}

/// Runs one full Dispatcher tick: reads queue depth and worker census,
/// computes [`plan`], and launches `to_start` workers, retrying a
/// transient launch failure up to `policy.launch_retries` times within
/// this invocation. A launch that is still failing once retries are
/// exhausted is logged and left for the next tick (§4.7): the Dispatcher
/// never fails the whole invocation over it.
pub async fn dispatch(
    launcher: &Arc<dyn ComputeLauncher>,
    depth_source: &Arc<dyn crate::ports::QueueClient>,
    policy: &DispatchPolicy,
) -> Result<DispatchPlan> {
    let queue_depth = depth_source.depth().await?;
    let census = launcher.list_workers().await?;
    let decision = plan(queue_depth, census, policy);

    if decision.to_start == 0 {
        info!(desired = decision.desired, running = census.running, pending = census.pending, "no launch needed this tick");
        return Ok(decision);
    }

    let mut attempt = 0u32;
    loop {
        match launcher.launch(policy.preemptible_weight, decision.to_start).await {
            Ok(()) => {
                info!(to_start = decision.to_start, desired = decision.desired, "launched workers");
                return Ok(decision);
            }
            Err(err) if attempt < policy.launch_retries => {
                attempt += 1;
                warn!(attempt, error = %err, "launch failed, retrying within this invocation");
            }
            Err(err) => {
                warn!(error = %err, "launch failed, leaving remainder for next tick");
                return Ok(decision);
            }
        }
    }
}
