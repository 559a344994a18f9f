// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key resolution: map every schema leaf to a store secret or a runtime
//! fallback.
//!
//! For a leaf at path `[redis, shards]` and prefix `app` the store is
//! searched for `app_redis_shards`, then `redis_shards`. Each candidate is
//! compared against every listed secret before the next candidate is tried.
//! A leaf that matches nothing falls back to the runtime when it has a
//! default, an env alias or an optional format; otherwise resolution fails
//! with the list of keys that were tried.

mod secret;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use console::style;
use thiserror::Error;

use crate::schema::{ConfigurationLeaf, ConfigurationSchema};
use crate::store::{CatchAllClient, CatchAllEntry, SecretEntry, StoreClient, StoreEntry, StoreError};

pub use secret::{ResolvedSecret, RuntimeSecret, StoreSecret};

/// Resolved secrets indexed by leaf key.
pub type ResolutionMap = BTreeMap<String, ResolvedSecret>;

#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// Neither the store nor a runtime fallback can supply the leaf.
    #[error("{}; secret store keys: {:?}", .leaf.key(), .candidates)]
    NotFound {
        leaf: ConfigurationLeaf,
        candidates: Vec<String>,
    },
}

impl ResolveError {
    pub fn leaf(&self) -> &ConfigurationLeaf {
        match self {
            ResolveError::NotFound { leaf, .. } => leaf,
        }
    }

    /// Multi-line description with the leaf's format and doc.
    pub fn describe(&self) -> String {
        let leaf = self.leaf();
        let mut out = format!("- {self}\n  {}", leaf.format);
        if !leaf.doc.is_empty() {
            out.push_str(&format!("\n  doc: {}", leaf.doc));
        }
        out
    }
}

/// Decides whether a listed secret satisfies a candidate key.
pub trait Matcher: Debug + Send + Sync {
    fn matches(&self, leaf: &ConfigurationLeaf, entry: &dyn SecretEntry, candidate: &str) -> bool;
}

/// Short name equals the candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactMatcher;

impl Matcher for ExactMatcher {
    fn matches(&self, _leaf: &ConfigurationLeaf, entry: &dyn SecretEntry, candidate: &str) -> bool {
        entry.short_name() == candidate
    }
}

/// Short name equals the candidate once a namespace ending in `separator` is
/// stripped, so `team/redis_shards` satisfies `redis_shards`.
#[derive(Debug, Clone)]
pub struct SuffixMatcher {
    pub separator: String,
}

impl SuffixMatcher {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }
}

impl Default for SuffixMatcher {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Matcher for SuffixMatcher {
    fn matches(&self, _leaf: &ConfigurationLeaf, entry: &dyn SecretEntry, candidate: &str) -> bool {
        let name = entry.short_name();
        let local = match name.rfind(self.separator.as_str()) {
            Some(at) if !self.separator.is_empty() => &name[at + self.separator.len()..],
            _ => name,
        };
        local == candidate
    }
}

/// Store keys to look for, most specific first, all lower-case.
pub fn candidate_keys(prefix: &str, path: &[String]) -> Vec<String> {
    let joined = path.join("_");
    let mut keys = Vec::with_capacity(2);
    if !prefix.is_empty() {
        keys.push(format!("{prefix}_{joined}").to_lowercase());
    }
    keys.push(joined.to_lowercase());
    keys
}

/// Outcome of resolving one leaf.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub resolved: ResolvedSecret,
    /// Every option considered, store candidates first, runtime last.
    pub candidates: Vec<ResolvedSecret>,
}

/// Resolve one leaf with [`ExactMatcher`].
pub fn resolve_conf(
    leaf: &ConfigurationLeaf,
    entries: &[StoreEntry],
    prefix: &str,
    client: Option<&StoreClient>,
) -> Result<Resolution, ResolveError> {
    resolve_conf_with(leaf, entries, prefix, client, &ExactMatcher)
}

/// Resolve one leaf against the listed `entries`.
pub fn resolve_conf_with(
    leaf: &ConfigurationLeaf,
    entries: &[StoreEntry],
    prefix: &str,
    client: Option<&StoreClient>,
    matcher: &dyn Matcher,
) -> Result<Resolution, ResolveError> {
    let keys = candidate_keys(prefix, &leaf.path);

    let mut candidates: Vec<ResolvedSecret> = keys
        .iter()
        .map(|key| ResolvedSecret::store(key, None, client.cloned()))
        .collect();
    let runtime = leaf
        .has_runtime_fallback()
        .then(|| ResolvedSecret::runtime(leaf));
    candidates.extend(runtime.clone());

    for key in &keys {
        if let Some(entry) = entries
            .iter()
            .find(|entry| matcher.matches(leaf, entry.as_ref(), key))
        {
            let resolved = ResolvedSecret::store(key, Some(entry.clone()), client.cloned());
            return Ok(Resolution {
                resolved,
                candidates,
            });
        }
    }

    match runtime {
        Some(resolved) => Ok(Resolution {
            resolved,
            candidates,
        }),
        None => Err(ResolveError::NotFound {
            leaf: leaf.clone(),
            candidates: keys,
        }),
    }
}

/// Result of resolving a whole schema.
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    pub resolved: ResolutionMap,
    pub failures: Vec<ResolveError>,
}

impl ResolveReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Settings passed to a [`SchemaResolver`].
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub prefix: String,
    pub verbose: bool,
    pub matcher: Arc<dyn Matcher>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            verbose: false,
            matcher: Arc::new(ExactMatcher),
        }
    }
}

/// Turns a schema into a [`ResolveReport`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&mut self, schema: &ConfigurationSchema) -> Result<ResolveReport, StoreError>;

    /// Client used to fetch resolved values.
    fn client(&self) -> StoreClient;

    fn is_verbose(&self) -> bool {
        false
    }
}

/// One line of verbose resolver output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerboseLine {
    /// The leaf key being resolved.
    Key(String),
    /// The candidate that was picked.
    Selected(String),
    /// A candidate that was considered but not picked.
    Candidate(String),
}

impl std::fmt::Display for VerboseLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerboseLine::Key(key) => write!(f, "{}", style(format!("{key}:")).blue()),
            VerboseLine::Selected(c) => write!(f, "{}", style(format!("- {c}")).green()),
            VerboseLine::Candidate(c) => write!(f, "{}", style(format!("- {c}")).blue()),
        }
    }
}

/// The lines verbose mode prints for one leaf: its key, then every
/// candidate with the chosen one marked.
pub fn verbose_lines(
    leaf: &ConfigurationLeaf,
    outcome: &Result<Resolution, ResolveError>,
) -> Vec<VerboseLine> {
    let mut lines = vec![VerboseLine::Key(leaf.key())];
    match outcome {
        Ok(resolution) => {
            let selected = resolution.resolved.to_string();
            for candidate in &resolution.candidates {
                let candidate = candidate.to_string();
                if candidate == selected {
                    lines.push(VerboseLine::Selected(candidate));
                } else {
                    lines.push(VerboseLine::Candidate(candidate));
                }
            }
        }
        Err(ResolveError::NotFound { candidates, .. }) => {
            lines.extend(
                candidates
                    .iter()
                    .map(|key| VerboseLine::Candidate(format!("secretmanager(key: {key})"))),
            );
        }
    }
    lines
}

/// Resolver backed by a secret store.
///
/// The store listing is fetched on first use and reused for every later
/// call on the same instance.
#[derive(Debug)]
pub struct SchemaResolver {
    client: StoreClient,
    options: ResolverOptions,
    cached_available: Option<Vec<StoreEntry>>,
}

impl SchemaResolver {
    pub fn new(client: StoreClient, options: ResolverOptions) -> Self {
        Self {
            client,
            options,
            cached_available: None,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    async fn available(&mut self) -> Result<Vec<StoreEntry>, StoreError> {
        if let Some(entries) = &self.cached_available {
            return Ok(entries.clone());
        }
        let entries = self.client.list_keys().await?;
        log::debug!("Listed {} secrets from the store", entries.len());
        self.cached_available = Some(entries.clone());
        Ok(entries)
    }

    fn print_candidates(&self, leaf: &ConfigurationLeaf, outcome: &Result<Resolution, ResolveError>) {
        for line in verbose_lines(leaf, outcome) {
            eprintln!("{line}");
        }
    }
}

#[async_trait]
impl Resolver for SchemaResolver {
    async fn resolve(&mut self, schema: &ConfigurationSchema) -> Result<ResolveReport, StoreError> {
        if self.options.verbose {
            eprintln!("{}", style("Secret store verbose output").blue());
        }

        let available = self.available().await?;
        let mut report = ResolveReport::default();

        for leaf in &schema.leaves {
            let outcome = resolve_conf_with(
                leaf,
                &available,
                &self.options.prefix,
                Some(&self.client),
                self.options.matcher.as_ref(),
            );
            if self.options.verbose {
                self.print_candidates(leaf, &outcome);
            }
            match outcome {
                Ok(resolution) => {
                    report.resolved.insert(leaf.key(), resolution.resolved);
                }
                Err(err) => report.failures.push(err),
            }
        }

        if !report.failures.is_empty() {
            for failure in &report.failures {
                log::warn!("No secret value resolved for {failure}");
            }
            if self.options.verbose {
                eprintln!("{}", style("No secret value resolved for:").red());
                for failure in &report.failures {
                    eprintln!("{}", style(failure.describe()).red());
                }
            }
        }

        Ok(report)
    }

    fn client(&self) -> StoreClient {
        self.client.clone()
    }

    fn is_verbose(&self) -> bool {
        self.options.verbose
    }
}

/// Dry-run resolver: every leaf without a runtime fallback resolves to an
/// empty synthetic secret. Leaves with a fallback are left out.
#[derive(Debug, Default, Clone, Copy)]
pub struct CatchAllResolver;

#[async_trait]
impl Resolver for CatchAllResolver {
    async fn resolve(&mut self, schema: &ConfigurationSchema) -> Result<ResolveReport, StoreError> {
        let client = self.client();
        let resolved = schema
            .leaves
            .iter()
            .filter(|leaf| !leaf.has_runtime_fallback())
            .map(|leaf| {
                let key = candidate_keys("", &leaf.path).remove(0);
                let entry: StoreEntry = Arc::new(CatchAllEntry::new(&key));
                let secret = ResolvedSecret::store(key, Some(entry), Some(client.clone()));
                (leaf.key(), secret)
            })
            .collect();
        Ok(ResolveReport {
            resolved,
            failures: Vec::new(),
        })
    }

    fn client(&self) -> StoreClient {
        Arc::new(CatchAllClient)
    }
}
