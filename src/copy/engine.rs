//! Copy engine implementation (C2 algorithm, §4.2).

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::config::{CopyPolicy, RetryPolicy};
use crate::copy::plan::{select_plan, PlanKind};
use crate::error::{MirrorError, Result};
use crate::model::CompletedPartSpec;
use crate::ports::{SourceStore, TargetStore};
use crate::retry::{backoff_delay, cancellable};

/// Marker S3 error code surfaced when a single `copy_object` targets an
/// object at or beyond the service's single-call copy limit; the adapter
/// threads it through `CopyFailed`'s reason so this engine can recognize
/// it without depending on any AWS type.
pub const ENTITY_TOO_LARGE_MARKER: &str = "EntityTooLarge";

/// Runs the copy engine's algorithm for one `key` (§4.2 steps 1-5).
///
/// `source_bucket` is the configured source; the target key is identical
/// to `key` (no key remapping). Returns `Ok(())` both when the copy
/// completed and when the source object was already gone (the idempotent
/// existence-probe miss). `target`/`source` are `Arc`-shared so the
/// multipart path can fan part-copy calls out across spawned tasks
/// without the engine caring whether the store is a live SDK client or a
/// test fake.
#[instrument(skip(source, target, copy_policy, retry_policy, cancel), fields(key = %key))]
pub async fn copy(
    source: &Arc<dyn SourceStore>,
    target: &Arc<dyn TargetStore>,
    source_bucket: &str,
    key: &str,
    copy_policy: &CopyPolicy,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let head_result = cancellable(source.head(source_bucket, key), cancel, || MirrorError::CopyFailed {
        key: key.to_string(),
        reason: "cancelled during source head probe".to_string(),
    })
    .await?;

    let Some(meta) = head_result else {
        tracing::debug!(key = %key, "source object missing, treating creation as already-deleted");
        return Ok(());
    };

    let plan = select_plan(
        key,
        meta.size,
        copy_policy.single_copy_ceiling,
        copy_policy.part_size,
    )?;

    match plan {
        PlanKind::Single => match cancellable(
            target.copy_single(source_bucket, key, key),
            cancel,
            || MirrorError::CopyFailed {
                key: key.to_string(),
                reason: "cancelled during single copy".to_string(),
            },
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(err) if is_entity_too_large(&err) => {
                warn!(key = %key, "single copy rejected as too large, escalating to multipart");
                let parts = crate::copy::plan::build_parts(key, meta.size, copy_policy.part_size)?;
                run_multipart(target, source_bucket, key, parts, copy_policy, retry_policy, cancel)
                    .await
            }
            Err(err) => Err(err),
        },
        PlanKind::Multipart(parts) => {
            run_multipart(target, source_bucket, key, parts, copy_policy, retry_policy, cancel).await
        }
    }
}

fn is_entity_too_large(err: &MirrorError) -> bool {
    matches!(err, MirrorError::CopyFailed { reason, .. } if reason.contains(ENTITY_TOO_LARGE_MARKER))
}

/// Drives the multipart path (§4.2 step 4): initiate, fan out part copies
/// across a `COPY_PARALLELISM`-bounded pool, complete on all-success,
/// abort and cancel outstanding tasks on any exhausted-retry failure.
async fn run_multipart(
    target: &Arc<dyn TargetStore>,
    source_bucket: &str,
    key: &str,
    parts: Vec<crate::model::PartSpec>,
    copy_policy: &CopyPolicy,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let upload_id = cancellable(target.initiate_multipart(key), cancel, || MirrorError::CopyFailed {
        key: key.to_string(),
        reason: "cancelled before multipart upload could be initiated".to_string(),
    })
    .await?;
    tracing::debug!(key = %key, upload_id = %upload_id, parts = parts.len(), "multipart upload initiated");

    match drive_parts(
        target,
        source_bucket,
        key,
        &upload_id,
        parts,
        copy_policy,
        retry_policy,
        cancel,
    )
    .await
    {
        Ok(completed) => {
            target
                .complete_multipart(key, &upload_id, &completed)
                .await?;
            tracing::debug!(key = %key, upload_id = %upload_id, "multipart upload completed");
            Ok(())
        }
        Err(err) => {
            // §8 invariant 3 / §4.2 guarantee: any failure path after
            // creation must attempt an abort before returning. Deliberately
            // not raced against `cancel`: this call only runs once `cancel`
            // has already tripped (preemption, or a sibling part's
            // permanent failure), so racing it here would skip the cleanup
            // it exists to perform. Bounded by the adapter's own
            // per-request timeout and, ultimately, the worker's drain
            // deadline.
            if let Err(abort_err) = target.abort_multipart(key, &upload_id).await {
                warn!(
                    key = %key, upload_id = %upload_id, error = %abort_err,
                    "abort_multipart itself failed; upload_id left for the target's lifecycle policy to reap"
                );
            }
            Err(err)
        }
    }
}

/// Runs all part copies under a `copy_parallelism`-wide semaphore,
/// retrying each part up to `part_retries` with jittered backoff, and
/// stops issuing new part attempts as soon as one part is permanently
/// failed or the cancellation token trips.
async fn drive_parts(
    target: &Arc<dyn TargetStore>,
    source_bucket: &str,
    key: &str,
    upload_id: &str,
    parts: Vec<crate::model::PartSpec>,
    copy_policy: &CopyPolicy,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<CompletedPartSpec>> {
    let semaphore = Arc::new(Semaphore::new(copy_policy.copy_parallelism.max(1)));
    let etags: Arc<Mutex<BTreeMap<u32, CompletedPartSpec>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let mut joins: JoinSet<Result<()>> = JoinSet::new();

    for part in parts {
        let semaphore = semaphore.clone();
        let etags = etags.clone();
        let cancel = cancel.clone();
        let retry_policy = retry_policy.clone();
        let key = key.to_string();
        let source_bucket = source_bucket.to_string();
        let upload_id = upload_id.to_string();
        let target = target.clone();

        joins.spawn(async move {
            copy_one_part(
                &target,
                &source_bucket,
                &key,
                &upload_id,
                part,
                &semaphore,
                &etags,
                &retry_policy,
                &cancel,
            )
            .await
        });
    }

    let mut first_error: Option<MirrorError> = None;
    while let Some(result) = joins.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(err);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(MirrorError::CopyFailed {
                        key: key.to_string(),
                        reason: format!("part task panicked: {join_err}"),
                    });
                }
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    let etags = etags.lock().await;
    Ok(etags.values().cloned().collect())
}

#[allow(clippy::too_many_arguments)]
async fn copy_one_part(
    target: &Arc<dyn TargetStore>,
    source_bucket: &str,
    key: &str,
    upload_id: &str,
    part: crate::model::PartSpec,
    semaphore: &Semaphore,
    etags: &Mutex<BTreeMap<u32, CompletedPartSpec>>,
    retry_policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let _permit = semaphore
        .acquire()
        .await
        .expect("semaphore is never closed while parts are in flight");

    if cancel.is_cancelled() {
        return Err(MirrorError::CopyFailed {
            key: key.to_string(),
            reason: "cancelled before part copy started".to_string(),
        });
    }

    let mut attempt = 0u32;
    loop {
        let outcome = cancellable(
            target.copy_part(key, upload_id, part.number, source_bucket, key, part.range),
            cancel,
            || MirrorError::CopyFailed {
                key: key.to_string(),
                reason: format!("cancelled during part {} copy", part.number),
            },
        )
        .await;

        match outcome {
            Ok(etag) => {
                etags.lock().await.insert(
                    part.number,
                    CompletedPartSpec {
                        number: part.number,
                        range: part.range,
                        etag,
                    },
                );
                return Ok(());
            }
            Err(err) if attempt < retry_policy.part_retries => {
                attempt += 1;
                warn!(
                    key = %key, part = part.number, attempt, error = %err,
                    "part copy failed, retrying with backoff"
                );
                let delay = backoff_delay(retry_policy.initial_backoff, attempt - 1, retry_policy.backoff_jitter);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(MirrorError::CopyFailed {
                            key: key.to_string(),
                            reason: "cancelled during part retry backoff".to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                return Err(MirrorError::CopyFailed {
                    key: key.to_string(),
                    reason: format!("part {} exhausted retries: {err}", part.number),
                });
            }
        }
    }
}
