//! External-collaborator contracts (C7). These traits are the entire
//! surface the core consumes from the durable queue, the two object
//! stores, and the compute platform; concrete realizations live in
//! [`crate::backend::aws`] (production) and [`crate::testing`] (tests).

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{CompletedPartSpec, ObjectMeta, QueueDepth, RawMessage, Receipt, WorkerCensus};

/// The durable, at-least-once message queue the worker long-polls.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn receive(&self, wait_seconds: u32, max_msgs: u32) -> Result<Vec<RawMessage>>;
    async fn ack(&self, receipt: &Receipt) -> Result<()>;
    async fn extend(&self, receipt: &Receipt, seconds: u32) -> Result<()>;
    async fn depth(&self) -> Result<QueueDepth>;
}

/// The single-zone target object store the mirror writes and deletes
/// into. A worker constructs at most one in-flight multipart upload per
/// `(key, worker)` against this contract.
#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>>;

    async fn copy_single(&self, src_bucket: &str, src_key: &str, dst_key: &str) -> Result<()>;

    async fn initiate_multipart(&self, dst_key: &str) -> Result<String>;

    async fn copy_part(
        &self,
        dst_key: &str,
        upload_id: &str,
        part_number: u32,
        src_bucket: &str,
        src_key: &str,
        byte_range: (u64, u64),
    ) -> Result<String>;

    async fn complete_multipart(
        &self,
        dst_key: &str,
        upload_id: &str,
        parts: &[CompletedPartSpec],
    ) -> Result<()>;

    async fn abort_multipart(&self, dst_key: &str, upload_id: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// The high-durability source object store that emitted the event
/// driving this copy.
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;
}

/// What the Dispatcher uses to read live-worker counts and launch more.
/// The Dispatcher does not care what a "worker" physically is.
#[async_trait]
pub trait ComputeLauncher: Send + Sync {
    async fn list_workers(&self) -> Result<WorkerCensus>;

    /// Requests `count` additional workers, weighting preemptible vs.
    /// on-demand capacity as `(preemptible, on_demand)`.
    async fn launch(&self, preemptible_weight: (u32, u32), count: u32) -> Result<()>;
}
