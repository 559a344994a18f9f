// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;
use crate::schema::parse;
use crate::store::{InMemoryClient, Labels, SecretStoreClient};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
struct CountingClient {
    inner: InMemoryClient,
    lists: AtomicUsize,
}

#[async_trait]
impl SecretStoreClient for CountingClient {
    async fn list_keys(&self) -> Result<Vec<StoreEntry>, StoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_keys().await
    }

    async fn get(&self, short_name: &str) -> Result<StoreEntry, StoreError> {
        self.inner.get(short_name).await
    }

    async fn create(&self, short_name: &str, labels: Labels) -> Result<StoreEntry, StoreError> {
        self.inner.create(short_name, labels).await
    }
}

fn store(seed: &[(&str, &str)]) -> StoreClient {
    Arc::new(InMemoryClient::new(
        "test",
        seed.iter().map(|(k, v)| (k.to_string(), v.to_string())),
    ))
}

fn leaf(schema: &str, key: &str) -> ConfigurationLeaf {
    parse(schema.as_bytes()).unwrap().leaf(key).unwrap().clone()
}

const SHARDS: &str = r#"{"redis":{"shards":{"format":"Array","default":null,"env":"REDIS_SHARDS"}}}"#;
const REQUIRED: &str = r#"{"redis":{"host":{"format":"String","default":null}}}"#;

#[test]
fn test_candidate_keys() {
    let path = vec!["Redis".to_string(), "Shards".to_string()];
    assert_eq!(
        candidate_keys("MyApp", &path),
        vec!["myapp_redis_shards", "redis_shards"]
    );
    assert_eq!(candidate_keys("", &path), vec!["redis_shards"]);
    assert_eq!(candidate_keys("MyApp", &path), candidate_keys("MyApp", &path));
}

#[tokio::test]
async fn test_prefixed_candidate_wins_over_listing_order() {
    let client = store(&[("redis_shards", "bare"), ("myapp_redis_shards", "prefixed")]);
    let entries = vec![
        client.get("redis_shards").await.unwrap(),
        client.get("myapp_redis_shards").await.unwrap(),
    ];
    let leaf = leaf(SHARDS, "redis.shards");

    let resolution = resolve_conf(&leaf, &entries, "myapp", Some(&client)).unwrap();
    match &resolution.resolved {
        ResolvedSecret::Store(secret) => assert_eq!(secret.key, "myapp_redis_shards"),
        other => panic!("expected a store secret, got {other}"),
    }
    assert_eq!(
        resolution.resolved.get_secret_value().await.unwrap(),
        Some(json!("prefixed"))
    );
    assert_eq!(
        resolution.resolved.annotation(),
        "secretmanager(fullname: projects/test/secrets/myapp_redis_shards)"
    );

    let listed: Vec<String> = resolution.candidates.iter().map(|c| c.to_string()).collect();
    assert_eq!(
        listed,
        vec![
            "secretmanager(key: myapp_redis_shards)",
            "secretmanager(key: redis_shards)",
            "runtime(env: $REDIS_SHARDS)",
        ]
    );
}

#[test]
fn test_runtime_fallback_when_store_has_nothing() {
    let leaf = leaf(
        r#"{"LOG_LEVEL":{"format":"String","default":"info","env":"LOG_LEVEL"}}"#,
        "LOG_LEVEL",
    );
    let resolution = resolve_conf(&leaf, &[], "", None).unwrap();
    assert!(resolution.resolved.is_runtime());
    assert_eq!(
        resolution.resolved.annotation(),
        r#"runtime(env: $LOG_LEVEL or default: "info")"#
    );
}

#[test]
fn test_required_leaf_without_match_fails() {
    let leaf = leaf(REQUIRED, "redis.host");
    let err = resolve_conf(&leaf, &[], "app", None).unwrap_err();

    let ResolveError::NotFound { candidates, .. } = &err;
    assert_eq!(candidates, &vec!["app_redis_host", "redis_host"]);
    assert_eq!(
        err.to_string(),
        r#"redis.host; secret store keys: ["app_redis_host", "redis_host"]"#
    );
    assert!(err.describe().contains("format: String"));
}

#[tokio::test]
async fn test_suffix_matcher_strips_namespace() {
    let client = store(&[("team/redis_shards", "1,2")]);
    let entries = client.list_keys().await.unwrap();
    let required = leaf(r#"{"redis":{"shards":{"format":"Array","default":null}}}"#, "redis.shards");

    assert!(resolve_conf(&required, &entries, "", Some(&client)).is_err());

    let matcher = SuffixMatcher::new("/");
    let resolution =
        resolve_conf_with(&required, &entries, "", Some(&client), &matcher).unwrap();
    match &resolution.resolved {
        ResolvedSecret::Store(secret) => {
            assert_eq!(secret.key, "redis_shards");
            assert_eq!(
                secret.entry.as_ref().map(|e| e.short_name()),
                Some("team/redis_shards")
            );
        }
        other => panic!("expected a store secret, got {other}"),
    }
    assert_eq!(
        resolution.resolved.get_secret_value().await.unwrap(),
        Some(json!("1,2"))
    );
}

#[test]
fn test_suffix_matcher_accepts_plain_names() {
    let entry = CatchAllEntry::new("redis_shards");
    let leaf = leaf(SHARDS, "redis.shards");
    assert!(SuffixMatcher::default().matches(&leaf, &entry, "redis_shards"));
    assert!(!SuffixMatcher::default().matches(&leaf, &entry, "shards"));
    assert!(ExactMatcher.matches(&leaf, &entry, "redis_shards"));
}

#[tokio::test]
async fn test_resolver_lists_store_once_and_collects_failures() {
    let counting = Arc::new(CountingClient {
        inner: InMemoryClient::new("test", vec![("redis_shards", "1,2,3")]),
        lists: AtomicUsize::new(0),
    });
    let schema = parse(
        br#"{
        redis: {
            shards: { format: "Array", default: null },
            host: { format: "String", default: null },
        },
        log: { level: { default: "info" } },
    }"#,
    )
    .unwrap();

    let mut resolver = SchemaResolver::new(counting.clone(), ResolverOptions::default());
    let report = resolver.resolve(&schema).await.unwrap();
    resolver.resolve(&schema).await.unwrap();

    assert_eq!(counting.lists.load(Ordering::SeqCst), 1);
    assert_eq!(
        report.resolved.keys().cloned().collect::<Vec<_>>(),
        vec!["log.level", "redis.shards"]
    );
    assert!(report.resolved["log.level"].is_runtime());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].leaf().key(), "redis.host");
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_verbose_resolver_still_resolves() {
    let options = ResolverOptions {
        prefix: "myapp4".to_string(),
        verbose: true,
        ..ResolverOptions::default()
    };
    let mut resolver = SchemaResolver::new(store(&[("myapp4_redis_shards", "x")]), options);
    assert!(resolver.is_verbose());

    let report = resolver.resolve(&parse(SHARDS.as_bytes()).unwrap()).await.unwrap();
    assert_eq!(
        report.resolved["redis.shards"].to_string(),
        "secretmanager(key: myapp4_redis_shards)"
    );
}

#[tokio::test]
async fn test_verbose_lines_mark_selected_candidate() {
    let client = store(&[("redis_shards", "bare"), ("myapp_redis_shards", "prefixed")]);
    let entries = client.list_keys().await.unwrap();
    let leaf = leaf(SHARDS, "redis.shards");

    let outcome = resolve_conf(&leaf, &entries, "myapp", Some(&client));
    assert_eq!(
        verbose_lines(&leaf, &outcome),
        vec![
            VerboseLine::Key("redis.shards".to_string()),
            VerboseLine::Selected("secretmanager(key: myapp_redis_shards)".to_string()),
            VerboseLine::Candidate("secretmanager(key: redis_shards)".to_string()),
            VerboseLine::Candidate("runtime(env: $REDIS_SHARDS)".to_string()),
        ]
    );
}

#[test]
fn test_verbose_lines_list_keys_tried_for_unresolved_leaf() {
    let leaf = leaf(r#"{"token":{"format":"String","default":null}}"#, "token");
    let outcome = resolve_conf(&leaf, &[], "myapp", None);
    assert!(outcome.is_err());

    let lines = verbose_lines(&leaf, &outcome);
    assert_eq!(lines[0], VerboseLine::Key("token".to_string()));
    assert_eq!(
        lines[1..].to_vec(),
        vec![
            VerboseLine::Candidate("secretmanager(key: myapp_token)".to_string()),
            VerboseLine::Candidate("secretmanager(key: token)".to_string()),
        ]
    );
    assert!(lines[1].to_string().contains("- secretmanager(key: myapp_token)"));
}

#[tokio::test]
async fn test_lazy_store_secret_fetches_by_key() {
    let client = store(&[("token", "abc")]);
    let secret = ResolvedSecret::store("token", None, Some(client));
    assert_eq!(secret.annotation(), "secretmanager(key: token)");
    assert_eq!(secret.get_secret_value().await.unwrap(), Some(json!("abc")));

    let orphan = ResolvedSecret::store("token", None, None);
    assert_eq!(
        orphan.get_secret_value().await.unwrap_err(),
        StoreError::NotFound("token".to_string())
    );
}

#[tokio::test]
async fn test_non_utf8_payload_is_an_error() {
    let client: StoreClient = Arc::new(InMemoryClient::new("p", [("blob", vec![0xff, 0xfe, 0x41])]));
    let secret = ResolvedSecret::store("blob", None, Some(client));
    assert_eq!(
        secret.get_secret_value().await.unwrap_err(),
        StoreError::InvalidUtf8("projects/p/secrets/blob".to_string())
    );
}

#[tokio::test]
async fn test_catch_all_resolver_covers_required_leaves() {
    let schema = parse(
        br#"{
        redis: { host: { format: "String", default: null } },
        log: { level: { default: "info" } },
    }"#,
    )
    .unwrap();

    let report = CatchAllResolver.resolve(&schema).await.unwrap();
    assert_eq!(report.resolved.len(), 1);
    let host = &report.resolved["redis.host"];
    assert_eq!(host.to_string(), "secretmanager(key: redis_host)");
    assert_eq!(host.get_secret_value().await.unwrap(), Some(json!("")));
}
