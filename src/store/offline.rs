// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Offline store loaded from a dotenv file.

use std::path::Path;

use super::{InMemoryClient, StoreError};

impl InMemoryClient {
    /// Build a store from a dotenv file; every `KEY=value` line becomes a
    /// secret named `KEY`.
    pub fn from_dotenv<P: AsRef<Path>>(path: P, project: &str) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let pairs = dotenvy::from_path_iter(path)
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?
            .collect::<Result<Vec<(String, String)>, _>>()
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;

        log::debug!(
            "Loaded {} offline secrets from {}",
            pairs.len(),
            path.display()
        );
        Ok(Self::new(project, pairs))
    }
}
