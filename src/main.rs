mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bucketmirror::backend::aws::{AwsAdapterConfig, AwsQueueClient, AwsS3Store, EcsComputeLauncher};
use bucketmirror::ports::{ComputeLauncher, QueueClient, SourceStore, TargetStore};
use bucketmirror::worker::WorkerHandles;
use bucketmirror::{dispatcher, worker, Config};

use cli::{Cli, Commands};

/// ECS's own built-in capacity providers for Fargate; see
/// [`EcsComputeLauncher`]'s preemptible/on-demand split.
const FARGATE_SPOT_PROVIDER: &str = "FARGATE_SPOT";
const FARGATE_PROVIDER: &str = "FARGATE";

#[tokio::main]
async fn main() {
    init_tracing();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "unrecoverable startup failure");
            3
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        eprintln!("usage: bucketmirror <dispatch|worker>");
        return Ok(2);
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return Ok(2);
        }
    };
    let adapter_config = match AwsAdapterConfig::from_env() {
        Ok(adapter_config) => adapter_config,
        Err(err) => {
            error!(error = %err, "invalid AWS adapter configuration");
            return Ok(2);
        }
    };

    match command {
        Commands::Dispatch => run_dispatch(config, adapter_config).await,
        Commands::Worker => run_worker(config, adapter_config).await,
    }
}

async fn sdk_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        builder = builder.region(aws_config::Region::new(region.to_string()));
    }
    builder.load().await
}

async fn run_dispatch(config: Config, adapter_config: AwsAdapterConfig) -> anyhow::Result<i32> {
    let sdk_config = sdk_config(adapter_config.region.as_deref()).await;

    let queue: Arc<dyn QueueClient> = Arc::new(AwsQueueClient::new(
        aws_sdk_sqs::Client::new(&sdk_config),
        config.queue_url.clone(),
    ));
    let launcher: Arc<dyn ComputeLauncher> = Arc::new(EcsComputeLauncher::new(
        aws_sdk_ecs::Client::new(&sdk_config),
        adapter_config.compute_cluster.clone(),
        adapter_config.compute_task_definition.clone(),
        FARGATE_SPOT_PROVIDER,
        FARGATE_PROVIDER,
        adapter_config.compute_subnets.clone(),
        adapter_config.compute_security_groups.clone(),
    ));

    let plan = dispatcher::dispatch(&launcher, &queue, &config.dispatch)
        .await
        .context("dispatcher tick failed")?;
    info!(
        desired = plan.desired,
        to_start = plan.to_start,
        running = plan.census.running,
        pending = plan.census.pending,
        "dispatch tick complete"
    );
    Ok(0)
}

async fn run_worker(config: Config, adapter_config: AwsAdapterConfig) -> anyhow::Result<i32> {
    let target_sdk_config = sdk_config(adapter_config.region.as_deref()).await;
    let source_sdk_config = match adapter_config.source_region.as_deref() {
        Some(region) => sdk_config(Some(region)).await,
        None => target_sdk_config.clone(),
    };

    let queue: Arc<dyn QueueClient> = Arc::new(AwsQueueClient::new(
        aws_sdk_sqs::Client::new(&target_sdk_config),
        config.queue_url.clone(),
    ));
    let source: Arc<dyn SourceStore> = Arc::new(AwsS3Store::new(
        aws_sdk_s3::Client::new(&source_sdk_config),
        config.source_bucket.clone(),
    ));
    let target: Arc<dyn TargetStore> = Arc::new(AwsS3Store::new(
        aws_sdk_s3::Client::new(&target_sdk_config),
        config.target_bucket.clone(),
    ));

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining");
        signal_shutdown.cancel();
    });

    let summary = worker::run(WorkerHandles { queue, source, target }, Arc::new(config), shutdown)
        .await
        .map_err(anyhow::Error::from)
        .context("worker exited on an unrecoverable error")?;
    info!(
        final_state = ?summary.final_state,
        messages_processed = summary.messages_processed,
        messages_acked = summary.messages_acked,
        "worker exited"
    );
    Ok(0)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
