//! Command-line surface: one binary image serves as both the Dispatcher's
//! periodic invocation target and the Worker's long-running process,
//! mirroring this codebase's `Cli { command: Option<Commands> }` shape.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bucketmirror")]
#[command(about = "Queue-driven mirror from a durable source bucket to a single-zone target bucket", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one Dispatcher tick: inspect queue depth and worker census, launch
    /// workers under policy caps, then exit. Intended to be invoked on a
    /// schedule by an external clock.
    Dispatch,
    /// Run the Worker loop: long-poll the queue and drain it until idle or
    /// until a shutdown signal requests a drain.
    Worker,
}
