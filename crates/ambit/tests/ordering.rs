use std::time::Duration;

use ambit::ambient::{self, AmbientValue};
use ambit::{DeliveryOrder, OrderedTasks, TaskError};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

async fn delayed<T>(ms: u64, value: T) -> T {
    sleep(Duration::from_millis(ms)).await;
    value
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn values_come_back_in_submission_order() {
    let c0 = tokio::spawn(delayed(200, 0));
    let c1 = tokio::spawn(delayed(100, 1));
    let c2 = tokio::spawn(async { 2 });

    let tasks = OrderedTasks::new([c1, c2, c0]).unwrap();
    let mut values = Vec::new();
    for handle in tasks {
        values.push(handle.await.unwrap());
    }
    assert_eq!(values, vec![1, 2, 0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_order_mode_follows_finish_order() {
    let tasks = OrderedTasks::spawn_all_with_order(
        [(300, "slow"), (0, "fast"), (150, "middle")]
            .into_iter()
            .map(|(ms, label)| move || delayed(ms, label)),
        DeliveryOrder::Completion,
    )
    .unwrap();
    assert_eq!(tasks.order(), DeliveryOrder::Completion);

    let values: Vec<_> = tasks.into_stream().map(Result::unwrap).collect().await;
    assert_eq!(values, vec!["fast", "middle", "slow"]);
}

#[tokio::test]
async fn yields_exactly_one_handle_per_computation() {
    let mut tasks = OrderedTasks::spawn_all((0..3).map(|i| move || async move { i })).unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks.size_hint(), (3, Some(3)));

    let mut count = 0;
    while let Some(handle) = tasks.next() {
        assert_eq!(handle.ordinal(), count);
        handle.await.unwrap();
        count += 1;
    }
    assert_eq!(count, 3);
    assert_eq!(tasks.remaining(), 0);
    assert!(tasks.next().is_none());
    assert!(tasks.next().is_none());
}

#[tokio::test]
async fn empty_input_ends_immediately() {
    let mut tasks = OrderedTasks::<u8>::new(Vec::new()).unwrap();
    assert!(tasks.is_empty());
    assert!(tasks.next().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_surfaces_at_its_own_position() {
    let tasks = OrderedTasks::spawn_all((0..3).map(|i| {
        move || async move {
            match i {
                0 => delayed(50, 1).await,
                1 => panic!("sensor offline"),
                _ => delayed(10, 3).await,
            }
        }
    }))
    .unwrap();

    let outcomes: Vec<_> = tasks.into_stream().collect().await;
    assert_eq!(outcomes[0], Ok(1));
    assert_eq!(outcomes[1], Err(TaskError::Panicked("sensor offline".into())));
    assert_eq!(outcomes[2], Ok(3));
}

#[tokio::test]
async fn computation_errors_are_delivered_unchanged() {
    #[derive(Debug, PartialEq)]
    struct Refused(&'static str);

    let results = [Err(Refused("quota")), Ok(9u8)];
    let tasks = OrderedTasks::spawn_all(results.into_iter().map(|result| move || async move { result })).unwrap();

    let outcomes: Vec<_> = tasks.into_stream().collect().await;
    assert_eq!(outcomes, vec![Ok(Err(Refused("quota"))), Ok(Ok(9))]);
}

#[tokio::test]
async fn aborted_task_reads_as_cancelled() {
    let stuck = tokio::spawn(delayed(60_000, 'x'));
    stuck.abort();
    let done = tokio::spawn(async { 'y' });

    let tasks = OrderedTasks::new([stuck, done]).unwrap();
    let outcomes: Vec<_> = tasks.into_stream().collect().await;
    assert_eq!(outcomes, vec![Err(TaskError::Cancelled), Ok('y')]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handles_requested_up_front_each_get_their_own_value() {
    let tasks = OrderedTasks::spawn_all((0..20u64).map(|i| move || delayed((20 - i) * 5, i))).unwrap();
    let handles: Vec<_> = tasks.collect();
    assert_eq!(handles.len(), 20);

    // Await in reverse so later ordinals resolve before earlier ones are read.
    let mut values = Vec::new();
    for handle in handles.into_iter().rev() {
        values.push(handle.await.unwrap());
    }
    values.reverse();
    assert_eq!(values, (0..20).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_racing_completions_stay_ordered() {
    let tasks = OrderedTasks::spawn_all((0..500u64).map(|i| {
        move || async move {
            if i % 3 == 0 {
                tokio::task::yield_now().await;
            } else {
                sleep(Duration::from_micros((i * 37) % 900)).await;
            }
            i
        }
    }))
    .unwrap();

    let values: Vec<_> = tasks.into_stream().map(Result::unwrap).collect().await;
    assert_eq!(values, (0..500).collect::<Vec<_>>());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Region(String);
impl AmbientValue for Region {}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_computations_inherit_the_ambient_branch() {
    ambient::Snapshot::empty()
        .scope(async {
            ambient::set(&Region("eu-west".into())).unwrap();
            let tasks = OrderedTasks::spawn_all((0..4).map(|i| {
                move || async move {
                    let seen = ambient::get::<Region>().unwrap();
                    // Writes inside one computation stay inside it.
                    ambient::set(&Region(format!("task-{}", i))).unwrap();
                    seen
                }
            }))
            .unwrap();

            let seen: Vec<_> = tasks.into_stream().map(Result::unwrap).collect().await;
            assert!(seen.iter().all(|region| region == &Some(Region("eu-west".into()))));
            assert_eq!(ambient::get::<Region>().unwrap(), Some(Region("eu-west".into())));
        })
        .await;
}
