//! Deterministic in-memory fakes of every external-collaborator contract
//! (C7 / §6.1), used by this crate's own `#[cfg(test)]` unit tests and by
//! the top-level `tests/` integration suites to exercise C1-C6 without a
//! network dependency (§8, §10.4).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MirrorError, Result};
use crate::model::{
    CompletedPartSpec, ObjectMeta, QueueDepth, RawMessage, Receipt, WorkerCensus,
};
use crate::ports::{ComputeLauncher, QueueClient, SourceStore, TargetStore};

/// An in-memory stand-in for the durable queue: messages are enqueued with
/// [`MockQueueClient::push`], received in FIFO order, and tracked as
/// in-flight until acked, extended, or found expired.
#[derive(Default)]
pub struct MockQueueClient {
    visible: Mutex<VecDeque<QueuedMessage>>,
    in_flight: Mutex<HashMap<String, QueuedMessage>>,
    expired_receipts: Mutex<HashSet<String>>,
    transiently_failing_receipts: Mutex<HashSet<String>>,
    ack_calls: Mutex<Vec<Receipt>>,
    extend_calls: AtomicU32,
    receive_calls: AtomicU32,
}

#[derive(Clone)]
struct QueuedMessage {
    body: String,
    receipt: Receipt,
    attempts: u32,
}

impl MockQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a visible message with the given body and receipt handle.
    pub fn push(&self, body: impl Into<String>, receipt: impl Into<String>) {
        self.push_with_attempts(body, receipt, 1);
    }

    pub fn push_with_attempts(
        &self,
        body: impl Into<String>,
        receipt: impl Into<String>,
        attempts: u32,
    ) {
        self.visible.lock().unwrap().push_back(QueuedMessage {
            body: body.into(),
            receipt: Receipt(receipt.into()),
            attempts,
        });
    }

    /// Marks a receipt as expired: the next `extend` call against it fails
    /// with [`MirrorError::LeaseLost`], simulating "message no longer
    /// exists" (§4.4).
    pub fn expire(&self, receipt: &str) {
        self.expired_receipts
            .lock()
            .unwrap()
            .insert(receipt.to_string());
    }

    /// Marks a receipt so every `extend` call against it fails with an
    /// ordinary [`MirrorError::QueueUnavailable`] (a transient/throttling
    /// error), distinct from [`Self::expire`]'s "message is gone"
    /// `LeaseLost` — the adapter's own bounded retry distinguishes the two
    /// (§4.4/§7).
    pub fn fail_extend_transiently(&self, receipt: &str) {
        self.transiently_failing_receipts
            .lock()
            .unwrap()
            .insert(receipt.to_string());
    }

    pub fn acked(&self) -> Vec<Receipt> {
        self.ack_calls.lock().unwrap().clone()
    }

    pub fn extend_call_count(&self) -> u32 {
        self.extend_calls.load(Ordering::SeqCst)
    }

    pub fn receive_call_count(&self) -> u32 {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}

#[async_trait]
impl QueueClient for MockQueueClient {
    async fn receive(&self, _wait_seconds: u32, max_msgs: u32) -> Result<Vec<RawMessage>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut visible = self.visible.lock().unwrap();
        let mut in_flight = self.in_flight.lock().unwrap();
        let mut out = Vec::new();
        for _ in 0..max_msgs {
            let Some(msg) = visible.pop_front() else {
                break;
            };
            in_flight.insert(msg.receipt.0.clone(), msg.clone());
            out.push(RawMessage {
                body: msg.body,
                receipt: msg.receipt,
                attempts: msg.attempts,
            });
        }
        Ok(out)
    }

    async fn ack(&self, receipt: &Receipt) -> Result<()> {
        self.in_flight.lock().unwrap().remove(&receipt.0);
        self.ack_calls.lock().unwrap().push(receipt.clone());
        Ok(())
    }

    async fn extend(&self, receipt: &Receipt, _seconds: u32) -> Result<()> {
        self.extend_calls.fetch_add(1, Ordering::SeqCst);
        if self.expired_receipts.lock().unwrap().contains(&receipt.0) {
            return Err(MirrorError::LeaseLost(receipt.0.clone()));
        }
        if self.transiently_failing_receipts.lock().unwrap().contains(&receipt.0) {
            return Err(MirrorError::QueueUnavailable(format!("{receipt}: simulated transient throttling")));
        }
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        Ok(QueueDepth {
            visible: self.visible.lock().unwrap().len() as u64,
            in_flight: self.in_flight.lock().unwrap().len() as u64,
        })
    }
}

/// An in-memory stand-in for the target store: tracks which keys "exist"
/// and counts every operation so tests can assert on call shape (§8).
#[derive(Default)]
pub struct MockTargetStore {
    objects: Mutex<HashSet<String>>,
    active_uploads: Mutex<HashSet<String>>,
    part_attempts: Mutex<HashMap<u32, u32>>,
    permanently_failing_parts: Mutex<HashSet<u32>>,
    flaky_parts: Mutex<HashMap<u32, u32>>,
    copy_calls: AtomicU32,
    multipart_initiations: AtomicU32,
    completed_multiparts: AtomicU32,
    aborted_multiparts: AtomicU32,
    delete_calls: AtomicU32,
    part_delay: Mutex<Option<std::time::Duration>>,
}

impl MockTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains(key)
    }

    pub fn copy_calls(&self) -> u32 {
        self.copy_calls.load(Ordering::SeqCst)
    }

    pub fn multipart_initiations(&self) -> u32 {
        self.multipart_initiations.load(Ordering::SeqCst)
    }

    pub fn completed_multiparts(&self) -> u32 {
        self.completed_multiparts.load(Ordering::SeqCst)
    }

    pub fn aborted_multiparts(&self) -> u32 {
        self.aborted_multiparts.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Every `copy_part` call for `part_number` fails.
    pub fn fail_part_permanently(&self, part_number: u32) {
        self.permanently_failing_parts
            .lock()
            .unwrap()
            .insert(part_number);
    }

    /// The first `times` `copy_part` calls for `part_number` fail
    /// transiently; subsequent calls succeed.
    pub fn fail_part_times(&self, part_number: u32, times: u32) {
        self.flaky_parts.lock().unwrap().insert(part_number, times);
    }

    /// Every `copy_part` call sleeps for `delay` before resolving, so a
    /// test can observe a preemption signal arriving while parts are
    /// still in flight (§8 property 7, scenario S7).
    pub fn set_part_delay(&self, delay: std::time::Duration) {
        *self.part_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl TargetStore for MockTargetStore {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        if self.objects.lock().unwrap().contains(key) {
            Ok(Some(ObjectMeta { size: 0, etag: None }))
        } else {
            Ok(None)
        }
    }

    async fn copy_single(&self, _src_bucket: &str, _src_key: &str, dst_key: &str) -> Result<()> {
        self.copy_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(dst_key.to_string());
        Ok(())
    }

    async fn initiate_multipart(&self, _dst_key: &str) -> Result<String> {
        self.multipart_initiations.fetch_add(1, Ordering::SeqCst);
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.active_uploads.lock().unwrap().insert(upload_id.clone());
        Ok(upload_id)
    }

    async fn copy_part(
        &self,
        _dst_key: &str,
        upload_id: &str,
        part_number: u32,
        _src_bucket: &str,
        _src_key: &str,
        _byte_range: (u64, u64),
    ) -> Result<String> {
        let delay = *self.part_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.active_uploads.lock().unwrap().contains(upload_id) {
            return Err(MirrorError::CopyFailed {
                key: upload_id.to_string(),
                reason: "copy_part against unknown or completed upload_id".to_string(),
            });
        }

        if self
            .permanently_failing_parts
            .lock()
            .unwrap()
            .contains(&part_number)
        {
            return Err(MirrorError::CopyFailed {
                key: upload_id.to_string(),
                reason: format!("simulated permanent failure on part {part_number}"),
            });
        }

        let mut flaky = self.flaky_parts.lock().unwrap();
        if let Some(remaining) = flaky.get_mut(&part_number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MirrorError::CopyFailed {
                    key: upload_id.to_string(),
                    reason: format!("simulated transient failure on part {part_number}"),
                });
            }
        }
        drop(flaky);

        let mut attempts = self.part_attempts.lock().unwrap();
        *attempts.entry(part_number).or_insert(0) += 1;
        Ok(format!("etag-{part_number}"))
    }

    async fn complete_multipart(
        &self,
        dst_key: &str,
        upload_id: &str,
        parts: &[CompletedPartSpec],
    ) -> Result<()> {
        if !self.active_uploads.lock().unwrap().remove(upload_id) {
            return Err(MirrorError::CopyFailed {
                key: dst_key.to_string(),
                reason: "complete_multipart against unknown upload_id".to_string(),
            });
        }
        let mut sorted = parts.to_vec();
        sorted.sort_by_key(|p| p.number);
        for window in sorted.windows(2) {
            if window[0].number >= window[1].number {
                panic!("complete_multipart received non-monotonic part numbers");
            }
        }
        self.completed_multiparts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(dst_key.to_string());
        Ok(())
    }

    async fn abort_multipart(&self, _dst_key: &str, upload_id: &str) -> Result<()> {
        self.active_uploads.lock().unwrap().remove(upload_id);
        self.aborted_multiparts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// An in-memory stand-in for the source store: a fixed catalog of objects
/// set up by the test via [`MockSourceStore::with_object`]/[`MockSourceStore::insert`].
#[derive(Default)]
pub struct MockSourceStore {
    objects: Mutex<HashMap<String, ObjectMeta>>,
}

impl MockSourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(key: impl Into<String>, size: u64) -> Self {
        let store = Self::default();
        store.insert(key, size, None);
        store
    }

    pub fn insert(&self, key: impl Into<String>, size: u64, etag: Option<String>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.into(), ObjectMeta { size, etag });
    }
}

#[async_trait]
impl SourceStore for MockSourceStore {
    async fn head(&self, _bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }
}

/// An in-memory stand-in for the compute launcher: a settable census plus
/// a recorded history of `launch` calls.
pub struct MockComputeLauncher {
    census: Mutex<WorkerCensus>,
    launches: Mutex<Vec<u32>>,
    fail_next_n_launches: Mutex<u32>,
}

impl MockComputeLauncher {
    pub fn new(census: WorkerCensus) -> Self {
        Self {
            census: Mutex::new(census),
            launches: Mutex::new(Vec::new()),
            fail_next_n_launches: Mutex::new(0),
        }
    }

    pub fn launch_history(&self) -> Vec<u32> {
        self.launches.lock().unwrap().clone()
    }

    pub fn total_launched(&self) -> u32 {
        self.launches.lock().unwrap().iter().sum()
    }

    pub fn fail_next_launches(&self, n: u32) {
        *self.fail_next_n_launches.lock().unwrap() = n;
    }

    pub fn set_census(&self, census: WorkerCensus) {
        *self.census.lock().unwrap() = census;
    }
}

#[async_trait]
impl ComputeLauncher for MockComputeLauncher {
    async fn list_workers(&self) -> Result<WorkerCensus> {
        Ok(*self.census.lock().unwrap())
    }

    async fn launch(&self, _preemptible_weight: (u32, u32), count: u32) -> Result<()> {
        let mut remaining_failures = self.fail_next_n_launches.lock().unwrap();
        if *remaining_failures > 0 {
            *remaining_failures -= 1;
            return Err(MirrorError::LaunchFailed(
                "simulated transient launch failure".to_string(),
            ));
        }
        self.launches.lock().unwrap().push(count);
        Ok(())
    }
}
