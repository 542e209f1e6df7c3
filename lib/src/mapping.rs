// Copyright 2024 The Refab Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Partial bijections between source and target arguments.
//!
//! An [`ArgumentMapping`] records which source-side arguments correspond to
//! which target-side arguments. Every mapping is a valid matching: each
//! source has at most one target and vice versa. The algebra over mappings
//! (merge, invert, all combinations of alternatives) is what lets per-field
//! alignments be combined into per-change and per-task bindings.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;

use itertools::Itertools as _;
use thiserror::Error;

use crate::argument::Argument;
use crate::deadline::TimedOut;
use crate::deadline::check_deadline;

/// Two mapping pairs disagree on a source or target argument.
///
/// This is recovered locally by every operation that enumerates merges; it
/// never escapes the crate.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Mapping pairs would create an invalid matching")]
pub struct MatchingConflict;

/// A partial bijection from source arguments to target arguments.
///
/// Invariant: `forward` and `inverse` are exact mirrors of each other, so
/// round-tripping any key through both directions yields the key back.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArgumentMapping {
    forward: BTreeMap<Argument, Argument>,
    inverse: BTreeMap<Argument, Argument>,
}

impl ArgumentMapping {
    /// The empty mapping. Always a valid matching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mapping from `(source, target)` pairs. Fails if the pairs do
    /// not form a matching.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Argument, Argument)>,
    ) -> Result<Self, MatchingConflict> {
        let mut mapping = Self::new();
        for (source, target) in pairs {
            mapping.add_pair(source, target)?;
        }
        Ok(mapping)
    }

    /// The identity mapping over the given arguments.
    pub fn identity<'a>(arguments: impl IntoIterator<Item = &'a Argument>) -> Self {
        let mut mapping = Self::new();
        for arg in arguments {
            mapping.forward.insert(arg.clone(), arg.clone());
            mapping.inverse.insert(arg.clone(), arg.clone());
        }
        mapping
    }

    fn add_pair(&mut self, source: Argument, target: Argument) -> Result<(), MatchingConflict> {
        if let Some(mapped) = self.forward.get(&source)
            && *mapped != target
        {
            return Err(MatchingConflict);
        }
        if let Some(mapped) = self.inverse.get(&target)
            && *mapped != source
        {
            return Err(MatchingConflict);
        }
        self.inverse.insert(target.clone(), source.clone());
        self.forward.insert(source, target);
        Ok(())
    }

    /// Whether this is the empty mapping.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// The number of mapped pairs.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// The target bound to `source`, if any.
    pub fn target(&self, source: &Argument) -> Option<&Argument> {
        self.forward.get(source)
    }

    /// The source bound to `target`, if any.
    pub fn source(&self, target: &Argument) -> Option<&Argument> {
        self.inverse.get(target)
    }

    /// Whether `source` is bound by this mapping.
    pub fn contains_source(&self, source: &Argument) -> bool {
        self.forward.contains_key(source)
    }

    /// Iterates `(source, target)` pairs in source order.
    pub fn pairs(&self) -> impl Iterator<Item = (&Argument, &Argument)> {
        self.forward.iter()
    }

    /// Iterates the source-side arguments in order.
    pub fn sources(&self) -> impl Iterator<Item = &Argument> {
        self.forward.keys()
    }

    /// Iterates the target-side arguments in order.
    pub fn targets(&self) -> impl Iterator<Item = &Argument> {
        self.inverse.keys()
    }

    /// The `target => source` mapping.
    pub fn invert(&self) -> Self {
        Self {
            forward: self.inverse.clone(),
            inverse: self.forward.clone(),
        }
    }

    /// Merges two mappings into one. Fails if any argument would be bound
    /// twice.
    pub fn merge(&self, other: &Self) -> Result<Self, MatchingConflict> {
        let mut merged = self.clone();
        for (source, target) in &other.forward {
            merged.add_pair(source.clone(), target.clone())?;
        }
        Ok(merged)
    }

    /// Merges every mapping in `mappings` into one.
    pub fn merge_all<'a>(
        mappings: impl IntoIterator<Item = &'a Self>,
    ) -> Result<Self, MatchingConflict> {
        let mut merged = Self::new();
        for mapping in mappings {
            for (source, target) in &mapping.forward {
                merged.add_pair(source.clone(), target.clone())?;
            }
        }
        Ok(merged)
    }

    /// All valid mappings obtainable by choosing one alternative from each
    /// set and merging the choices.
    ///
    /// Each element of `alternatives` is a set of candidate mappings for one
    /// constituent (one field, one element pair). The result enumerates the
    /// Cartesian product, discarding combinations that conflict. An empty
    /// `alternatives` list or any empty constituent set yields the empty
    /// result. The product can be large, so the active deadline is checked
    /// per combination.
    pub fn all_combinations(
        alternatives: Vec<BTreeSet<Self>>,
    ) -> Result<BTreeSet<Self>, TimedOut> {
        if alternatives.is_empty() {
            return Ok(BTreeSet::new());
        }

        let mut merged = BTreeSet::new();
        for combination in alternatives
            .iter()
            .map(|set| set.iter())
            .multi_cartesian_product()
        {
            check_deadline()?;
            if let Ok(mapping) = Self::merge_all(combination) {
                merged.insert(mapping);
            }
        }
        Ok(merged)
    }
}

impl Display for ArgumentMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (source, target)) in self.forward.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{source} => {target}")?;
        }
        write!(f, "}}")
    }
}
