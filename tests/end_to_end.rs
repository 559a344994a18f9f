// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::{RunningProxy, gated_factory};
use sema::resolve::ResolvedSecret;
use sema::store::{InMemoryClient, ProxyClient};
use sema::{
    EmptyPolicy, Resolver, ResolverOptions, SchemaResolver, StoreClient, hydrate,
    hydrate_document, schema,
};
use serde_json::json;
use std::sync::Arc;

const REDIS_SCHEMA: &str = r#"{"redis":{"shards":{"format":"Array","default":null,"env":"REDIS_SHARDS"}}}"#;

fn resolver(client: StoreClient, prefix: &str) -> SchemaResolver {
    SchemaResolver::new(
        client,
        ResolverOptions {
            prefix: prefix.to_string(),
            ..ResolverOptions::default()
        },
    )
}

#[tokio::test]
async fn runtime_leaf_needs_no_store_value() {
    let (factory, counters, _gate) = gated_factory(&[], false);
    let schema = schema::parse(
        br#"{"LOG_LEVEL":{"format":"String","default":"info","env":"LOG_LEVEL"}}"#,
    )
    .unwrap();

    let report = resolver(factory("p").unwrap(), "").resolve(&schema).await.unwrap();
    assert!(report.is_complete());
    assert!(report.resolved["LOG_LEVEL"].is_runtime());

    let hydrated = hydrate(&schema.tree, &report.resolved).await;
    assert_eq!(hydrated.into_result().unwrap(), None);
    assert_eq!(counters.gets(), 0);
    assert_eq!(counters.values(), 0);
}

#[tokio::test]
async fn bare_key_hydrates_nested_document() {
    let client: StoreClient = Arc::new(InMemoryClient::new("p", [("redis_shards", "1,2,3,4,5")]));
    let schema = schema::parse(REDIS_SCHEMA.as_bytes()).unwrap();

    let report = resolver(client, "").resolve(&schema).await.unwrap();
    match &report.resolved["redis.shards"] {
        ResolvedSecret::Store(secret) => assert_eq!(secret.key, "redis_shards"),
        other => panic!("expected a store secret, got {other}"),
    }

    let document = hydrate_document(&schema.tree, &report.resolved, EmptyPolicy::EmptyObject)
        .await
        .into_result()
        .unwrap();
    assert_eq!(document, Some(json!({"redis": {"shards": "1,2,3,4,5"}})));
}

#[tokio::test]
async fn prefixed_key_is_selected() {
    let client: StoreClient = Arc::new(InMemoryClient::new(
        "p",
        [("myapp4_redis_shards", "6,7,8")],
    ));
    let schema = schema::parse(REDIS_SCHEMA.as_bytes()).unwrap();

    let report = resolver(client, "myapp4").resolve(&schema).await.unwrap();
    match &report.resolved["redis.shards"] {
        ResolvedSecret::Store(secret) => assert_eq!(secret.key, "myapp4_redis_shards"),
        other => panic!("expected a store secret, got {other}"),
    }

    let document = hydrate(&schema.tree, &report.resolved).await.into_result().unwrap();
    assert_eq!(document, Some(json!({"redis": {"shards": "6,7,8"}})));
}

#[tokio::test]
async fn resolving_through_the_proxy() {
    const SEED: &[(&str, &str)] = &[("myapp4_redis_shards", "6,7,8"), ("redis_shards", "1,2")];
    let (factory, counters, _gate) = gated_factory(SEED, false);
    let proxy = RunningProxy::start(factory).await;
    let schema = schema::parse(REDIS_SCHEMA.as_bytes()).unwrap();

    for _ in 0..3 {
        let client: StoreClient = Arc::new(ProxyClient::new(&proxy.url(""), "acme"));
        let report = resolver(client, "myapp4").resolve(&schema).await.unwrap();
        let document = hydrate(&schema.tree, &report.resolved).await.into_result().unwrap();
        assert_eq!(document, Some(json!({"redis": {"shards": "6,7,8"}})));
    }

    assert_eq!(counters.lists(), 1);
    assert_eq!(counters.values(), 1);

    proxy.shutdown().await;
}

#[tokio::test]
async fn unresolvable_leaves_are_collected() {
    let client: StoreClient = Arc::new(InMemoryClient::empty("p"));
    let schema = schema::parse(
        br#"{"a":{"format":"String","default":null},"b":{"format":"int","default":null},"c":{"format":"String","default":"x"}}"#,
    )
    .unwrap();

    let report = resolver(client, "").resolve(&schema).await.unwrap();
    let failed: Vec<_> = report.failures.iter().map(|f| f.leaf().key()).collect();
    assert_eq!(failed, vec!["a", "b"]);
    assert!(report.resolved.contains_key("c"));
}
