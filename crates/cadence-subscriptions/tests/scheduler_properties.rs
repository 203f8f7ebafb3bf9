//! Property tests for tick-to-task expansion.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;

use chrono::Duration;
use proptest::prelude::*;
use tokio_test::block_on;

use cadence_subscriptions::store::SubscriptionDataStore;
use cadence_test_utils::{SubscriptionFactory, TestContext, TickFactory};

proptest! {
    /// Contiguous ticks evaluate every aligned timestamp exactly once.
    #[test]
    fn contiguous_ticks_have_no_gaps_or_duplicates(
        resolution_secs in 1_i64..=600,
        start in 0_i64..86_400,
        spans in prop::collection::vec(0_i64..=900, 1..12),
    ) {
        let ctx = TestContext::new();
        block_on(ctx.add(SubscriptionFactory::with_resolution(Duration::seconds(resolution_secs))));
        let scheduler = ctx.scheduler();

        let durations: Vec<Duration> = spans.iter().copied().map(Duration::seconds).collect();
        let ticks = TickFactory::contiguous(TickFactory::at(start), &durations);

        let mut seen = Vec::new();
        for tick in &ticks {
            let tasks = block_on(scheduler.find(tick)).unwrap();
            let mut previous = None;
            for task in tasks {
                prop_assert!(tick.timestamps.contains_left_open(&task.timestamp));
                prop_assert_eq!(task.timestamp.timestamp() % resolution_secs, 0);
                prop_assert!(previous < Some(task.timestamp));
                previous = Some(task.timestamp);
                seen.push(task.timestamp);
            }
        }

        let unique: HashSet<_> = seen.iter().collect();
        prop_assert_eq!(unique.len(), seen.len());

        // Every aligned instant in (first lower, last upper] was produced.
        let lower = TickFactory::at(start).timestamp();
        let upper = lower + spans.iter().sum::<i64>();
        let expected = (lower + 1..=upper).filter(|s| s % resolution_secs == 0).count();
        prop_assert_eq!(seen.len(), expected);
    }
}

#[tokio::test]
async fn zero_resolution_evaluates_once_at_the_upper_bound() {
    let ctx = TestContext::new();
    ctx.add(SubscriptionFactory::with_resolution(Duration::zero())).await;

    let tick = TickFactory::tick(TickFactory::at(0), TickFactory::at(600));
    let tasks = ctx.scheduler().find(&tick).await.unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].timestamp, TickFactory::at(600));
}

#[tokio::test]
async fn scheduling_follows_store_changes_between_ticks() {
    let ctx = TestContext::new();
    let kept = ctx.add(SubscriptionFactory::structured()).await;
    let removed = ctx.add(SubscriptionFactory::legacy()).await;
    let scheduler = ctx.scheduler();

    ctx.store.delete(&removed).await.unwrap();
    let ticks = TickFactory::contiguous(
        TickFactory::at(0),
        &[Duration::minutes(2), Duration::minutes(2)],
    );

    let first = scheduler.find(&ticks[0]).await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|t| t.identifier().uuid() == kept));

    let added = ctx.add(SubscriptionFactory::legacy()).await;
    let second = scheduler.find(&ticks[1]).await.unwrap();
    let uuids: Vec<_> = second.iter().map(|t| t.identifier().uuid()).collect();
    assert_eq!(uuids, vec![kept, kept, added, added]);
    assert!(second.iter().all(|t| t.identifier().partition() == ctx.partition));
}
