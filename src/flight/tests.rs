// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;
use futures_util::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn counted(
    calls: &Arc<AtomicUsize>,
    result: Result<u32, StoreError>,
    delay: Duration,
) -> impl FnOnce() -> BoxFuture<'static, Result<u32, StoreError>> {
    let calls = calls.clone();
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            result
        }
        .boxed()
    }
}

#[tokio::test]
async fn test_concurrent_callers_share_one_fetch() {
    let flight: SingleFlight<String, u32> = SingleFlight::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let results = join_all((0..10).map(|_| {
        flight.run(
            "key".to_string(),
            counted(&calls, Ok(7), Duration::from_millis(50)),
        )
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|(r, _)| r == &Ok(7)));
    let fetched = results
        .iter()
        .filter(|(_, source)| *source == Source::Fetched)
        .count();
    assert_eq!(fetched, 1);
    assert!(results.iter().all(|(_, source)| !source.is_cache_hit()));
}

#[tokio::test]
async fn test_plain_flight_forgets_results() {
    let flight: SingleFlight<&'static str, u32> = SingleFlight::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let (first, _) = flight.run("k", counted(&calls, Ok(1), Duration::ZERO)).await;
    let (second, source) = flight.run("k", counted(&calls, Ok(2), Duration::ZERO)).await;

    assert_eq!(first, Ok(1));
    assert_eq!(second, Ok(2));
    assert_eq!(source, Source::Fetched);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(flight.peek(&"k"), None);
}

#[tokio::test]
async fn test_caching_flight_retains_success() {
    let flight: SingleFlight<&'static str, u32> = SingleFlight::caching();
    let calls = Arc::new(AtomicUsize::new(0));

    let (first, first_source) = flight.run("k", counted(&calls, Ok(1), Duration::ZERO)).await;
    let (second, second_source) = flight.run("k", counted(&calls, Ok(2), Duration::ZERO)).await;

    assert_eq!(first, Ok(1));
    assert_eq!(first_source, Source::Fetched);
    assert_eq!(second, Ok(1));
    assert_eq!(second_source, Source::Cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(flight.peek(&"k"), Some(1));
    assert_eq!(flight.cached_len(), 1);
}

#[tokio::test]
async fn test_errors_are_shared_and_not_cached() {
    let flight: SingleFlight<&'static str, u32> = SingleFlight::caching();
    let calls = Arc::new(AtomicUsize::new(0));
    let failure = StoreError::Upstream("boom".to_string());

    let results = join_all((0..5).map(|_| {
        flight.run(
            "k",
            counted(&calls, Err(failure.clone()), Duration::from_millis(30)),
        )
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|(r, _)| r == &Err(failure.clone())));

    // The slot is empty again, so the next caller retries.
    let (retry, source) = flight.run("k", counted(&calls, Ok(3), Duration::ZERO)).await;
    assert_eq!(retry, Ok(3));
    assert_eq!(source, Source::Fetched);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_distinct_keys_fetch_independently() {
    let flight: SingleFlight<&'static str, u32> = SingleFlight::caching();
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b) = tokio::join!(
        flight.run("a", counted(&calls, Ok(1), Duration::from_millis(20))),
        flight.run("b", counted(&calls, Ok(2), Duration::from_millis(20))),
    );

    assert_eq!(a.0, Ok(1));
    assert_eq!(b.0, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fetch_completes_after_caller_is_dropped() {
    let flight: SingleFlight<&'static str, u32> = SingleFlight::caching();
    let calls = Arc::new(AtomicUsize::new(0));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        flight.run("k", counted(&calls, Ok(9), Duration::from_millis(50))),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(flight.peek(&"k"), Some(9));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
