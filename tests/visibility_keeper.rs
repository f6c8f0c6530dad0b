//! Integration coverage for the visibility keeper (C4): background lease
//! extension bound to one in-flight message, against the in-memory queue
//! fake.

use std::sync::Arc;
use std::time::Duration;

use bucketmirror::config::VisibilityPolicy;
use bucketmirror::model::Receipt;
use bucketmirror::ports::QueueClient;
use bucketmirror::testing::MockQueueClient;
use bucketmirror::visibility::VisibilityKeeper;

fn fast_policy() -> VisibilityPolicy {
    VisibilityPolicy {
        visibility_timeout: Duration::from_secs(30),
        extend_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn keeper_extends_on_every_tick_until_stopped() {
    let queue_concrete = Arc::new(MockQueueClient::new());
    let queue: Arc<dyn QueueClient> = queue_concrete.clone();

    let keeper = VisibilityKeeper::start(queue, Receipt("r-keeper".into()), fast_policy());
    tokio::time::sleep(Duration::from_millis(55)).await;
    keeper.stop().await;

    assert!(queue_concrete.extend_call_count() >= 3);
}

#[tokio::test]
async fn keeper_stops_and_records_lease_lost_when_extend_fails() {
    let queue_concrete = Arc::new(MockQueueClient::new());
    queue_concrete.expire("r-gone");
    let queue: Arc<dyn QueueClient> = queue_concrete.clone();

    let keeper = VisibilityKeeper::start(queue, Receipt("r-gone".into()), fast_policy());
    tokio::time::sleep(Duration::from_millis(25)).await;

    assert!(keeper.lease_lost());
    keeper.stop().await;

    // No further extends accumulate once the keeper has stopped itself.
    let after_stop = queue_concrete.extend_call_count();
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(queue_concrete.extend_call_count(), after_stop);
}

#[tokio::test]
async fn transient_extend_failure_stops_the_keeper_but_does_not_claim_lease_lost() {
    let queue_concrete = Arc::new(MockQueueClient::new());
    queue_concrete.fail_extend_transiently("r-transient");
    let queue: Arc<dyn QueueClient> = queue_concrete.clone();

    let keeper = VisibilityKeeper::start(queue, Receipt("r-transient".into()), fast_policy());
    tokio::time::sleep(Duration::from_millis(25)).await;

    assert!(!keeper.lease_lost());
    keeper.stop().await;
}

#[tokio::test]
async fn dropping_the_keeper_without_stop_still_halts_the_background_task() {
    let queue_concrete = Arc::new(MockQueueClient::new());
    let queue: Arc<dyn QueueClient> = queue_concrete.clone();

    {
        let _keeper = VisibilityKeeper::start(queue, Receipt("r-dropped".into()), fast_policy());
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let at_drop = queue_concrete.extend_call_count();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // §9 "bare spawn-and-forget is incorrect": Drop must abort the ticker,
    // so no extends happen after the guard falls out of scope.
    assert_eq!(queue_concrete.extend_call_count(), at_drop);
}
