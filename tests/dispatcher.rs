//! Integration coverage for the Dispatcher (C6): the stateless scaling
//! decision plus the launch call, against the in-memory launcher fake.

use std::sync::Arc;

use bucketmirror::config::DispatchPolicy;
use bucketmirror::dispatcher::{dispatch, plan};
use bucketmirror::model::{QueueDepth, WorkerCensus};
use bucketmirror::ports::{ComputeLauncher, QueueClient};
use bucketmirror::testing::{MockComputeLauncher, MockQueueClient};

#[test]
fn s6_dispatcher_launches_ten_workers_for_the_literal_scenario() {
    let depth = QueueDepth { visible: 30, in_flight: 5 };
    let census = WorkerCensus { running: 2, pending: 0 };
    let policy = DispatchPolicy {
        target_backlog_per_task: 3,
        max_workers: 64,
        burst_start_limit: 20,
        ..DispatchPolicy::default()
    };

    let decision = plan(depth, census, &policy);

    assert_eq!(decision.desired, 12);
    assert_eq!(decision.to_start, 10);
}

#[tokio::test]
async fn scaling_bound_holds_after_a_real_dispatch_tick() {
    // §8 property 5: after any Dispatcher invocation, running+pending <=
    // MAX_WORKERS and net launches <= BURST_START_LIMIT.
    let queue = Arc::new(MockQueueClient::new());
    for i in 0..500 {
        queue.push("{}", format!("r-{i}"));
    }
    let queue_client: Arc<dyn QueueClient> = queue.clone();
    let launcher_concrete = Arc::new(MockComputeLauncher::new(WorkerCensus { running: 1, pending: 0 }));
    let launcher: Arc<dyn ComputeLauncher> = launcher_concrete.clone();
    let policy = DispatchPolicy::default();

    let decision = dispatch(&launcher, &queue_client, &policy).await.unwrap();

    assert!(decision.census.total() + launcher_concrete.total_launched() <= policy.max_workers);
    assert!(launcher_concrete.total_launched() <= policy.burst_start_limit);
}

#[tokio::test]
async fn a_second_tick_never_oversubscribes_against_workers_already_counted() {
    let queue = Arc::new(MockQueueClient::new());
    for i in 0..10 {
        queue.push("{}", format!("r-{i}"));
    }
    let queue_client: Arc<dyn QueueClient> = queue.clone();
    let launcher_concrete = Arc::new(MockComputeLauncher::new(WorkerCensus::default()));
    let launcher: Arc<dyn ComputeLauncher> = launcher_concrete.clone();
    let policy = DispatchPolicy::default();

    let first = dispatch(&launcher, &queue_client, &policy).await.unwrap();
    assert!(first.to_start > 0);

    // Simulate those workers having come up: the Dispatcher is a pure
    // function of observed state (§9), so feeding back the new census
    // must suppress further launches against an unchanged backlog.
    launcher_concrete.set_census(WorkerCensus {
        running: first.to_start,
        pending: 0,
    });
    let second = dispatch(&launcher, &queue_client, &policy).await.unwrap();

    assert_eq!(second.to_start, 0);
}
