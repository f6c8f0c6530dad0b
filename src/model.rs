//! Normalized data model shared by every component: the event adapter (C1)
//! produces [`SyncEvent`]s, the copy engine (C2) tiles large objects into
//! [`PartSpec`]s (see [`crate::copy::plan`] for plan selection), the worker
//! loop (C5) advances [`WorkerState`], and the dispatcher (C6) reasons
//! about [`QueueDepth`] and [`WorkerCensus`].

use std::time::Instant;

/// Opaque handle to a received queue message. Carried end-to-end from
/// `receive` through to `ack`/`extend`; never inspected by the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(pub String);

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A not-yet-normalized message as handed back by [`crate::ports::QueueClient::receive`].
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub body: String,
    pub receipt: Receipt,
    pub attempts: u32,
}

/// What happened to a source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Delete,
}

/// A normalized, source-of-truth unit of work. One queue message may fan
/// out into zero or more of these (§3 invariant: exactly one `kind` per
/// event).
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub kind: EventKind,
    pub key: String,
    pub size_hint: Option<u64>,
    pub etag_hint: Option<String>,
    pub received_at: Instant,
    pub receipt: Receipt,
    pub attempts: u32,
}

/// Approximate queue backlog as reported by the queue's depth API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: u64,
    pub in_flight: u64,
}

impl QueueDepth {
    pub fn total(&self) -> u64 {
        self.visible + self.in_flight
    }
}

/// Approximate count of live workers as reported by the compute launcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCensus {
    pub running: u32,
    pub pending: u32,
}

impl WorkerCensus {
    pub fn total(&self) -> u32 {
        self.running + self.pending
    }
}

/// One contiguous, non-overlapping byte range of a multipart plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSpec {
    pub number: u32,
    pub range: (u64, u64),
}

impl PartSpec {
    pub fn len(&self) -> u64 {
        self.range.1 - self.range.0
    }
}

/// A part once it has been copied and has a target-assigned ETag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartSpec {
    pub number: u32,
    pub range: (u64, u64),
    pub etag: String,
}

/// The pure-function output of one Dispatcher tick, independent of the
/// side-effecting launch call (§9 "Dispatcher statelessness", §8 property 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPlan {
    pub queue_depth: QueueDepth,
    pub census: WorkerCensus,
    pub desired: u32,
    pub to_start: u32,
}

/// Per-worker state machine (§3). Transitions are worker-local; there is
/// no shared state across workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Polling,
    Processing,
    Draining,
    Exited,
}

/// Metadata returned by a store's `head` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub etag: Option<String>,
}
