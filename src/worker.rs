//! Worker loop (C5): long-polls the queue, dispatches to the copy/delete
//! engines, acks on success, and self-exits on idle or preemption (§4.5).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::copy;
use crate::delete;
use crate::error::Result;
use crate::event::parse_envelope;
use crate::model::{EventKind, RawMessage, SyncEvent, WorkerState};
use crate::ports::{QueueClient, SourceStore, TargetStore};
use crate::visibility::VisibilityKeeper;

/// The clients a Worker owns exclusively for its whole lifetime (§5
/// "Shared resources": constructed once per Worker and reused).
#[derive(Clone)]
pub struct WorkerHandles {
    pub queue: Arc<dyn QueueClient>,
    pub source: Arc<dyn SourceStore>,
    pub target: Arc<dyn TargetStore>,
}

/// Outcome of one `run` call, mainly useful to tests: how the Worker
/// ended and how much it got done.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerRunSummary {
    pub final_state: Option<WorkerState>,
    pub messages_processed: u32,
    pub messages_acked: u32,
}

/// Runs the Worker state machine to completion: `STARTING -> POLLING <->
/// PROCESSING -> (DRAINING) -> EXITED` (§4.5). Returns once the Worker
/// has idled out, been told to drain via `shutdown`, or hit a fatal
/// queue error.
pub async fn run(handles: WorkerHandles, config: Arc<Config>, shutdown: CancellationToken) -> Result<WorkerRunSummary> {
    let mut summary = WorkerRunSummary {
        final_state: Some(WorkerState::Starting),
        ..Default::default()
    };
    let mut empty_polls = 0u32;

    info!("worker starting");
    summary.final_state = Some(WorkerState::Polling);

    loop {
        if shutdown.is_cancelled() {
            summary.final_state = Some(WorkerState::Draining);
            info!("shutdown requested while polling, worker draining with no work in flight");
            break;
        }

        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                summary.final_state = Some(WorkerState::Draining);
                info!("shutdown requested mid-poll, worker draining with no work in flight");
                break;
            }
            res = handles.queue.receive(config.worker.wait_time_seconds, config.worker.batch) => res?,
        };

        if received.is_empty() {
            empty_polls += 1;
            if empty_polls >= config.worker.empty_polls_before_exit {
                info!(empty_polls, "idle threshold reached, worker exiting");
                summary.final_state = Some(WorkerState::Exited);
                break;
            }
            continue;
        }
        empty_polls = 0;

        for raw in received {
            if shutdown.is_cancelled() {
                summary.final_state = Some(WorkerState::Draining);
                info!("shutdown requested, not starting another message");
                break;
            }

            summary.final_state = Some(WorkerState::Processing);
            summary.messages_processed += 1;

            let processing = process_message(raw, &handles, &config, shutdown.clone());
            tokio::pin!(processing);

            // DRAIN_DEADLINE (§4.5/§6) bounds how long the worker waits to
            // finish *after* preemption is signaled, not ordinary
            // processing: a multi-GB multipart copy is meant to run far
            // longer than that, protected by its own visibility lease. So
            // the timeout clock starts only once `shutdown` actually
            // cancels mid-message, not unconditionally on every message.
            let outcome = tokio::select! {
                biased;
                result = &mut processing => Some(result),
                _ = shutdown.cancelled() => {
                    warn!("shutdown requested mid-processing, bounding completion to the drain deadline");
                    match tokio::time::timeout(config.worker.drain_deadline, &mut processing).await {
                        Ok(result) => Some(result),
                        Err(_elapsed) => None,
                    }
                }
            };

            match outcome {
                Some(Ok(true)) => summary.messages_acked += 1,
                Some(Ok(false)) => {}
                Some(Err(err)) => error!(error = %err, "message processing failed"),
                None => {
                    warn!("drain deadline exceeded, abandoning in-flight message");
                    summary.final_state = Some(WorkerState::Exited);
                    return Ok(summary);
                }
            }
        }

        if shutdown.is_cancelled() {
            break;
        }
        summary.final_state = Some(WorkerState::Polling);
    }

    if summary.final_state != Some(WorkerState::Exited) {
        summary.final_state = Some(WorkerState::Exited);
    }
    Ok(summary)
}

/// Processes one raw message end to end: parse (C1), dispatch every
/// record sequentially to the copy or delete engine (C2/C3) under one
/// visibility keeper (C4), and ack iff every record in the message
/// succeeded. Returns `Ok(true)` if the message was acked, `Ok(false)` if
/// it was a legitimate zero-record no-op that was acked without any C2/C3
/// call, and `Err` if a record failed (message left un-acked, to
/// redrive).
#[instrument(skip(handles, config, shutdown), fields(receipt = %raw.receipt))]
async fn process_message(
    raw: RawMessage,
    handles: &WorkerHandles,
    config: &Config,
    shutdown: CancellationToken,
) -> Result<bool> {
    let events = match parse_envelope(&raw.body, &config.source_bucket, &config.prefix_filter, raw.receipt.clone(), raw.attempts) {
        Ok(events) => events,
        Err(err) => {
            warn!(error = %err, "malformed event, leaving message for redrive");
            return Err(err);
        }
    };

    if events.is_empty() {
        handles.queue.ack(&raw.receipt).await.ok();
        return Ok(true);
    }

    let keeper = VisibilityKeeper::start(handles.queue.clone(), raw.receipt.clone(), config.visibility.clone());

    // A sibling part's permanent failure cancels its own copy's task group
    // (src/copy/engine.rs's `drive_parts`) via this token, not the
    // process-wide `shutdown` signal — a per-message `COPY_FAILED` must
    // never be mistaken for SIGTERM by the poll loop in `run` above.
    let message_cancel = shutdown.child_token();
    let result = run_events(&events, handles, config, &message_cancel).await;
    let lease_was_lost = keeper.lease_lost();
    keeper.stop().await;

    if lease_was_lost {
        warn!(receipt = %raw.receipt, "visibility lease lost mid-flight; processing completed but ack is expected to fail, relying on redrive + idempotence (§4.4)");
    }

    match result {
        Ok(()) => {
            if let Err(err) = handles.queue.ack(&raw.receipt).await {
                // §4.4: acceptable — redrive plus idempotence cover it.
                warn!(error = %err, "ack failed, relying on redrive");
            }
            Ok(true)
        }
        Err(err) => Err(err),
    }
}

async fn run_events(
    events: &[SyncEvent],
    handles: &WorkerHandles,
    config: &Config,
    shutdown: &CancellationToken,
) -> Result<()> {
    for event in events {
        match event.kind {
            EventKind::Create => {
                copy::copy(
                    &handles.source,
                    &handles.target,
                    &config.source_bucket,
                    &event.key,
                    &config.copy,
                    &config.retry,
                    shutdown,
                )
                .await?;
            }
            EventKind::Delete => {
                delete::delete(&handles.target, &event.key, &config.retry, shutdown).await?;
            }
        }
    }
    Ok(())
}
