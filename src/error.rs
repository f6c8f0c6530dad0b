use thiserror::Error;

/// Error taxonomy for the mirror engine. Every fallible operation in this
/// crate returns [`Result<T>`], never a bare `anyhow::Error` — the CLI
/// binary is the only place that reaches for `anyhow::Context`.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// An event's `bucket` did not match the configured source bucket.
    #[error("config mismatch: event bucket '{0}' does not match configured source bucket")]
    ConfigMismatch(String),

    /// Required configuration was missing or invalid at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A queue message body could not be parsed into an event envelope.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// The source store's `head` call failed for a reason other than "not found".
    #[error("source head failed for '{key}': {reason}")]
    SourceHeadFailed { key: String, reason: String },

    /// A copy (single or multipart) could not be completed after retries.
    #[error("copy failed for '{key}': {reason}")]
    CopyFailed { key: String, reason: String },

    /// An object is too large to fit within `10_000` parts even at the
    /// maximum permitted part size.
    #[error("object '{key}' of size {size} bytes exceeds the maximum representable multipart plan")]
    ObjectTooLarge { key: String, size: u64 },

    /// A delete could not be completed after retries.
    #[error("delete failed for '{key}': {reason}")]
    DeleteFailed { key: String, reason: String },

    /// The visibility keeper lost its lease on a message mid-flight.
    /// Recovered locally — processing completes but the eventual ack is
    /// expected to fail, which is fine: redrive plus idempotence cover it.
    #[error("lease lost on receipt {0}")]
    LeaseLost(String),

    /// The queue was unavailable beyond the bounded retry budget.
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    /// The compute launcher failed to start requested workers.
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
