//! Integration coverage for the worker loop (C5): polling, acking,
//! idle-exit, and the preemption drain path, driven through the public
//! `worker::run` entry point against the in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bucketmirror::config::Config;
use bucketmirror::testing::{MockQueueClient, MockSourceStore, MockTargetStore};
use bucketmirror::worker::{self, WorkerHandles};

fn base_config() -> Config {
    Config {
        source_bucket: "SRC".into(),
        target_bucket: "DST".into(),
        queue_url: "q".into(),
        prefix_filter: String::new(),
        dispatch: Default::default(),
        visibility: Default::default(),
        worker: Default::default(),
        copy: Default::default(),
        retry: Default::default(),
    }
}

#[tokio::test]
async fn s1_small_object_round_trips_through_the_whole_loop() {
    let queue = Arc::new(MockQueueClient::new());
    queue.push(
        r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"a/b.txt","size":10}}}]}"#,
        "r-1",
    );
    let source = Arc::new(MockSourceStore::with_object("a/b.txt", 10));
    let target = Arc::new(MockTargetStore::new());
    let mut config = base_config();
    config.worker.empty_polls_before_exit = 1;

    let handles = WorkerHandles {
        queue: queue.clone(),
        source,
        target: target.clone(),
    };
    let summary = worker::run(handles, Arc::new(config), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.messages_acked, 1);
    assert!(target.contains("a/b.txt"));
    assert_eq!(queue.acked().len(), 1);
}

#[tokio::test]
async fn idle_queue_exits_after_the_configured_empty_poll_threshold() {
    let queue = Arc::new(MockQueueClient::new());
    let source = Arc::new(MockSourceStore::new());
    let target = Arc::new(MockTargetStore::new());
    let mut config = base_config();
    config.worker.empty_polls_before_exit = 3;
    config.worker.wait_time_seconds = 0;

    let handles = WorkerHandles {
        queue: queue.clone(),
        source,
        target,
    };
    let summary = worker::run(handles, Arc::new(config), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.messages_processed, 0);
    assert!(queue.receive_call_count() >= 3);
}

#[tokio::test]
async fn malformed_message_is_left_unacked_for_redrive() {
    let queue = Arc::new(MockQueueClient::new());
    queue.push("not valid json", "r-bad");
    let source = Arc::new(MockSourceStore::new());
    let target = Arc::new(MockTargetStore::new());
    let mut config = base_config();
    config.worker.empty_polls_before_exit = 1;

    let handles = WorkerHandles {
        queue: queue.clone(),
        source,
        target,
    };
    let summary = worker::run(handles, Arc::new(config), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.messages_acked, 0);
    assert!(queue.acked().is_empty());
}

#[tokio::test]
async fn s7_preemption_mid_multipart_aborts_upload_and_exits_within_drain_deadline() {
    let queue = Arc::new(MockQueueClient::new());
    queue.push(
        r#"{"Records":[{"eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"SRC"},"object":{"key":"big.bin","size":60}}}]}"#,
        "r-big",
    );
    let source = Arc::new(MockSourceStore::with_object("big.bin", 60));
    let target = Arc::new(MockTargetStore::new());
    // Each part copy takes 40ms; cancellation fires at ~10ms, well before
    // any part has finished, and well inside the drain deadline below.
    target.set_part_delay(Duration::from_millis(40));

    let mut config = base_config();
    config.copy.single_copy_ceiling = 10;
    config.copy.part_size = 10;
    config.copy.copy_parallelism = 2;
    config.worker.drain_deadline = Duration::from_secs(5);
    config.worker.empty_polls_before_exit = 1;

    let handles = WorkerHandles {
        queue: queue.clone(),
        source,
        target: target.clone(),
    };
    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown_for_signal.cancel();
    });

    let started = std::time::Instant::now();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        worker::run(handles, Arc::new(config), shutdown),
    )
    .await
    .expect("worker must exit within the drain deadline")
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.messages_acked, 0, "an aborted copy must never ack its message");
    assert!(queue.acked().is_empty());
    assert_eq!(target.aborted_multiparts(), 1);
    assert_eq!(target.completed_multiparts(), 0);
}
