//! AWS-backed adapters for the [`crate::ports`] contracts (§6.1):
//! [`AwsQueueClient`] over SQS, [`AwsS3Store`] over S3 (both object-store
//! contracts), and [`EcsComputeLauncher`] over ECS. Each adapter wraps a
//! single Smithy client and bounds every call with [`REQUEST_TIMEOUT`].

mod ecs;
mod queue;
mod s3;

pub use ecs::EcsComputeLauncher;
pub use queue::AwsQueueClient;
pub use s3::AwsS3Store;

use std::time::Duration;

use crate::error::{MirrorError, Result};

/// Per-request timeout applied to every suspension point (§5): "Every such
/// call carries a per-request timeout (default 60 s)".
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Races `fut` against [`REQUEST_TIMEOUT`], mapping an expiry to `timeout_err`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>, timeout_err: impl FnOnce() -> MirrorError) -> Result<T> {
    match tokio::time::timeout(REQUEST_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(timeout_err()),
    }
}

/// Configuration consumed only by the AWS adapters (§6.1): not part of the
/// portable core, but required to construct one. `source_region`, when
/// set, is the defining asymmetry this system exists to bridge — a
/// high-durability source bucket in one region mirrored into a
/// single-zone target bucket in another.
#[derive(Debug, Clone)]
pub struct AwsAdapterConfig {
    pub region: Option<String>,
    pub source_region: Option<String>,
    pub compute_cluster: String,
    pub compute_task_definition: String,
    pub compute_subnets: Vec<String>,
    pub compute_security_groups: Vec<String>,
}

impl AwsAdapterConfig {
    pub fn from_env() -> Result<Self> {
        let compute_cluster = require_env("COMPUTE_CLUSTER")?;
        let compute_task_definition = require_env("COMPUTE_TASK_DEFINITION")?;
        let compute_subnets = split_env("COMPUTE_SUBNETS")?;
        let compute_security_groups = split_env("COMPUTE_SECURITY_GROUPS")?;

        Ok(Self {
            region: std::env::var("AWS_REGION").ok(),
            source_region: std::env::var("SOURCE_AWS_REGION").ok(),
            compute_cluster,
            compute_task_definition,
            compute_subnets,
            compute_security_groups,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| MirrorError::InvalidConfig(format!("missing required env var {name}")))
}

fn split_env(name: &str) -> Result<Vec<String>> {
    let raw = require_env(name)?;
    Ok(raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
}
