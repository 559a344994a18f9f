// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error accumulator used wherever a walk must report every failure at once.
//!
//! Hydration and env-literal population never stop at the first failing leaf;
//! they push each failure into a [`MultiError`] and hand the whole set back to
//! the caller after the walk has finished.

use std::error::Error as StdError;
use std::fmt;

/// Boxed error stored by the accumulator.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Ordered collection of errors. Appending never discards earlier entries.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<BoxError>,
}

impl MultiError {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one error. Nested accumulators are flattened into this one.
    pub fn append<E>(&mut self, err: E)
    where
        E: Into<BoxError>,
    {
        let boxed: BoxError = err.into();
        match boxed.downcast::<MultiError>() {
            Ok(nested) => self.merge(*nested),
            Err(other) => self.errors.push(other),
        }
    }

    /// Move every error of `other` to the end of this accumulator.
    pub fn merge(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    /// Errors in the order they were appended.
    pub fn errors(&self) -> &[BoxError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was collected, otherwise the accumulator itself.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiple errors:")?;
        for err in &self.errors {
            write!(f, "\n- {err}")?;
        }
        Ok(())
    }
}

impl StdError for MultiError {}

impl<E> Extend<E> for MultiError
where
    E: Into<BoxError>,
{
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        for err in iter {
            self.append(err);
        }
    }
}
