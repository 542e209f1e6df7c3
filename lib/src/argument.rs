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

#![expect(missing_docs)]

//! Task arguments: the variable segments of configuration values.
//!
//! An [`Argument`] is a named hole standing for a value that was supplied to
//! a configuration task on invocation. Arguments are identified by their
//! string form only; the scalar they were parsed from and any emit-time
//! transformation ride along without affecting identity.

use std::cmp::Ordering;
use std::fmt;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;

/// A scalar value as it appears in a task invocation or an observed change.
///
/// This is the closed set of leaf types that task arguments and change
/// fields take. The string form (via [`Display`]) is what decomposition and
/// alignment operate on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// The scalar kind of a [`Primitive`], used to reject alignments between
/// values of different types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int,
    Str,
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::Int(_) => PrimitiveKind::Int,
            Self::Str(_) => PrimitiveKind::Str,
        }
    }

    /// Parses a string form back into a primitive of the given kind.
    ///
    /// This is the inverse of [`Display`] and is used when rebuilding a
    /// value whose holes were substituted. Returns `None` if the string no
    /// longer parses as the original kind.
    pub fn parse_as(kind: PrimitiveKind, s: &str) -> Option<Self> {
        match kind {
            PrimitiveKind::Bool => s.parse().ok().map(Self::Bool),
            PrimitiveKind::Int => s.parse().ok().map(Self::Int),
            PrimitiveKind::Str => Some(Self::Str(s.to_owned())),
        }
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Str => write!(f, "str"),
        }
    }
}

/// A pure string-to-string function applied when an argument is written back
/// into a task's literal argument structure.
///
/// Some arguments are canonicalized before matching (an Ansible
/// `group.collection` name participates in file paths as `group/collection`)
/// and must be un-canonicalized on emit. The transformer is carried on the
/// derived argument and excluded from its identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transformer {
    /// Pass the value through unchanged.
    #[default]
    Identity,
    /// Replace `/` with `.`, undoing a dotted-name-to-path canonicalization.
    RestoreDots,
}

impl Transformer {
    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Identity => value.to_owned(),
            Self::RestoreDots => value.replace('/', "."),
        }
    }
}

/// A named hole that stands for a variable segment of a string.
///
/// Equality, ordering, and hashing use the string form only: two arguments
/// with the same `value` are the same hole no matter where they were
/// extracted from or how they will be emitted.
#[derive(Clone, Debug)]
pub struct Argument {
    value: String,
    original: Primitive,
    pre_transform_value: Option<String>,
    transformer: Transformer,
}

impl Argument {
    pub fn new(original: impl Into<Primitive>) -> Self {
        let original = original.into();
        Self {
            value: original.to_string(),
            original,
            pre_transform_value: None,
            transformer: Transformer::Identity,
        }
    }

    /// Creates an argument derived from a canonicalized form of another
    /// value. `pre_transform_value` is the value before canonicalization;
    /// `transformer` undoes the canonicalization on emit.
    pub fn transformed(
        original: impl Into<Primitive>,
        transformer: Transformer,
        pre_transform_value: impl Into<String>,
    ) -> Self {
        let original = original.into();
        Self {
            value: original.to_string(),
            original,
            pre_transform_value: Some(pre_transform_value.into()),
            transformer,
        }
    }

    /// The string form that identifies this argument.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The scalar the argument was extracted from.
    pub fn original(&self) -> &Primitive {
        &self.original
    }

    /// The value before canonicalization, if the argument was derived.
    pub fn pre_transform_value(&self) -> Option<&str> {
        self.pre_transform_value.as_deref()
    }

    pub fn transformer(&self) -> Transformer {
        self.transformer
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Argument {}

impl PartialOrd for Argument {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Argument {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl Hash for Argument {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
