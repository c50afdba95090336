use std::collections::BTreeMap;

use ambit::ambient::{self, Snapshot};
use ambit::{OrderedTasks, TrackingContext};
use futures_util::StreamExt;

fn headers() -> BTreeMap<String, String> {
    [("AAA", "AAA"), ("BBB", "BBB")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Read the current context from three ordered concurrent tasks.
async fn seen_by_three_tasks() -> Vec<Option<TrackingContext>> {
    let tasks = OrderedTasks::spawn_all((0..3).map(|_| || async { TrackingContext::current().unwrap() })).unwrap();
    tasks.into_stream().map(Result::unwrap).collect().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn context_persists_across_concurrent_tasks() {
    Snapshot::empty()
        .scope(async {
            let master = TrackingContext::new_current_if_empty_with(headers()).unwrap();

            for seen in seen_by_three_tasks().await {
                let seen = seen.unwrap();
                assert_eq!(seen.call_chain_id(), master.call_chain_id());
                assert_eq!(seen.originator_utc_timestamp(), master.originator_utc_timestamp());
                assert_eq!(seen.extra_headers(), &headers());
            }
            assert_eq!(TrackingContext::current().unwrap(), Some(master));
        })
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn context_persists_through_nested_tasks() {
    Snapshot::empty()
        .scope(async {
            let master = TrackingContext::new_current_if_empty().unwrap().call_chain_id();

            let ids = ambient::spawn(async {
                let outer = TrackingContext::current().unwrap().unwrap().call_chain_id();
                let inner = ambient::spawn(async {
                    let middle = TrackingContext::current().unwrap().unwrap().call_chain_id();
                    let innermost = ambient::spawn_blocking(|| {
                        TrackingContext::current().unwrap().unwrap().call_chain_id()
                    })
                    .await
                    .unwrap();
                    [middle, innermost]
                })
                .await
                .unwrap();
                [outer, inner[0], inner[1]]
            })
            .await
            .unwrap();

            assert!(ids.iter().all(|id| *id == master));
        })
        .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn child_can_start_its_own_chain_without_touching_the_parent() {
    Snapshot::empty()
        .scope(async {
            let master = TrackingContext::new_current().unwrap();

            let child = ambient::spawn(async {
                let fresh = TrackingContext::new_current().unwrap();
                let grandchild = ambient::spawn(async { TrackingContext::current().unwrap() })
                    .await
                    .unwrap();
                (fresh, grandchild)
            });
            let (fresh, grandchild) = child.await.unwrap();

            assert_ne!(fresh.call_chain_id(), master.call_chain_id());
            assert_eq!(grandchild, Some(fresh));
            assert_eq!(TrackingContext::current().unwrap(), Some(master));
        })
        .await;
}

#[tokio::test]
async fn cleared_context_is_gone_only_below_the_clear() {
    Snapshot::empty()
        .scope(async {
            let master = TrackingContext::new_current().unwrap();
            let cleared = ambient::fork(async {
                TrackingContext::clear_current().unwrap();
                TrackingContext::current().unwrap()
            })
            .await;
            assert_eq!(cleared, None);
            assert_eq!(TrackingContext::current().unwrap(), Some(master));
        })
        .await;
}
