// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rebuild configuration values from a [`ResolutionMap`].
//!
//! [`hydrate`] walks the schema tree and produces the nested JSON document;
//! [`populate_env`] produces flat `ENV_NAME=value` literals for leaves that
//! declare an env alias. Both walk everything and return all failures
//! together.


use std::collections::BTreeMap;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::multierror::MultiError;
use crate::resolve::ResolutionMap;
use crate::schema::{ConfigurationLeaf, ConfigurationSchema, ConfigurationTree};
use crate::store::StoreError;

/// A leaf whose value could not be produced.
#[derive(Error, Debug, Clone)]
pub enum HydrateError {
    #[error("{key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("{key}: {source}")]
    Format {
        key: String,
        #[source]
        source: crate::format::FormatError,
    },
}

/// Value produced by a walk together with every error met on the way.
#[derive(Debug, Default)]
pub struct Hydrated {
    /// `None` when nothing below the node produced a value.
    pub value: Option<Value>,
    pub errors: MultiError,
}

impl Hydrated {
    pub fn into_result(self) -> Result<Option<Value>, MultiError> {
        self.errors.into_result().map(|()| self.value)
    }
}

/// How a document with no resolved content is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyPolicy {
    /// Leave it out.
    Absent,
    /// Render `{}`.
    #[default]
    EmptyObject,
}

/// Rebuild the nested value below `tree`.
///
/// Leaves missing from `map` contribute nothing. Groups whose children all
/// contribute nothing produce `None` rather than an empty object.
pub fn hydrate<'a>(tree: &'a ConfigurationTree, map: &'a ResolutionMap) -> BoxFuture<'a, Hydrated> {
    async move {
        match tree {
            ConfigurationTree::Leaf(leaf) => hydrate_leaf(leaf, map).await,
            ConfigurationTree::Node(node) => {
                let mut out = Map::new();
                let mut errors = MultiError::new();
                for (name, child) in &node.children {
                    let child = hydrate(child, map).await;
                    if let Some(value) = child.value {
                        out.insert(name.clone(), value);
                    }
                    errors.merge(child.errors);
                }

                Hydrated {
                    value: (!out.is_empty()).then_some(Value::Object(out)),
                    errors,
                }
            }
        }
    }
    .boxed()
}

async fn hydrate_leaf(leaf: &ConfigurationLeaf, map: &ResolutionMap) -> Hydrated {
    let key = leaf.key();
    let Some(secret) = map.get(&key) else {
        return Hydrated::default();
    };

    match secret.get_secret_value().await {
        Ok(value) => Hydrated {
            value,
            errors: MultiError::new(),
        },
        Err(source) => {
            let mut errors = MultiError::new();
            errors.append(HydrateError::Fetch { key, source });
            Hydrated {
                value: None,
                errors,
            }
        }
    }
}

/// Hydrate a whole schema, rendering an empty result according to `policy`.
pub async fn hydrate_document(
    tree: &ConfigurationTree,
    map: &ResolutionMap,
    policy: EmptyPolicy,
) -> Hydrated {
    let mut hydrated = hydrate(tree, map).await;
    if hydrated.value.is_none() && policy == EmptyPolicy::EmptyObject {
        hydrated.value = Some(Value::Object(Map::new()));
    }
    hydrated
}

/// Flat env literals for every resolved leaf with an `env` alias.
///
/// Runtime-backed leaves contribute nothing. Values that do not satisfy the
/// leaf's format are still emitted, with a warning.
pub async fn populate_env(
    schema: &ConfigurationSchema,
    map: &ResolutionMap,
) -> (BTreeMap<String, String>, MultiError) {
    let mut literals = BTreeMap::new();
    let mut errors = MultiError::new();

    for leaf in &schema.leaves {
        let Some(env) = leaf.env.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };
        let key = leaf.key();
        let Some(secret) = map.get(&key) else {
            continue;
        };

        let value = match secret.get_secret_value().await {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(source) => {
                errors.append(HydrateError::Fetch { key, source });
                continue;
            }
        };

        if let Value::String(raw) = &value {
            if let Err(err) = leaf.format.coerce(raw) {
                log::warn!("Value of {key} does not satisfy its {}: {err}", leaf.format);
            }
        }

        match leaf.format.flatten(&value) {
            Ok(flat) => {
                literals.insert(env.to_string(), flat);
            }
            Err(source) => errors.append(HydrateError::Format { key, source }),
        }
    }

    (literals, errors)
}

/// `(leaf key, provenance)` pairs in key order.
pub fn annotations(map: &ResolutionMap) -> Vec<(String, String)> {
    map.iter()
        .map(|(key, secret)| (key.clone(), secret.annotation()))
        .collect()
}
