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

//! Observable configuration changes.
//!
//! A [`Change`] is one unit of effect on an execution environment: a file
//! appeared, an environment variable was set, a service stopped. Every
//! string-typed field is a [`SyntheticValue`], so changes recorded from a
//! task execution carry that task's argument holes and can be mapped onto
//! concrete changes observed in an image diff.

use std::collections::BTreeSet;
use std::iter::zip;

use thiserror::Error;

use crate::argument::Argument;
use crate::argument::Primitive;
use crate::mapping::ArgumentMapping;
use crate::synthetic::MapError;
use crate::synthetic::SyntheticValue;

/// A set of changes, ordered by change kind and then by field values.
pub type ChangeSet = BTreeSet<Change>;

/// Whether a file content change added or removed a run of text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentChangeKind {
    Addition,
    Deletion,
}

impl ContentChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Deletion => "deletion",
        }
    }
}

/// One added or deleted run of text inside a changed file.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileContentChange {
    kind: ContentChangeKind,
    content: SyntheticValue,
}

impl FileContentChange {
    pub fn new(
        kind: ContentChangeKind,
        content: impl Into<Primitive>,
        pool: &BTreeSet<Argument>,
    ) -> Self {
        Self {
            kind,
            content: SyntheticValue::new(content, pool.iter().cloned()),
        }
    }

    pub fn kind(&self) -> ContentChangeKind {
        self.kind
    }

    pub fn content(&self) -> &SyntheticValue {
        &self.content
    }

    /// Re-decomposes the content over a new argument pool.
    pub fn from_arguments(&self, pool: &BTreeSet<Argument>) -> Self {
        Self {
            kind: self.kind,
            content: SyntheticValue::new(self.content.original().clone(), pool.iter().cloned()),
        }
    }

    pub fn from_mapping(&self, mapping: &ArgumentMapping) -> Result<Self, MapError> {
        Ok(Self {
            kind: self.kind,
            content: self.content.from_mapping(mapping)?,
        })
    }

    /// All argument mappings aligning this content change with another.
    /// Changes of different kinds never align.
    pub fn map_to_other(&self, other: &Self) -> Result<BTreeSet<ArgumentMapping>, MapError> {
        if self.kind != other.kind {
            return Ok(BTreeSet::new());
        }
        self.content.map_to_primitive(other.content.original())
    }
}

/// A single observable change to an execution environment.
///
/// The variant set is closed. Variants are declared in name order so the
/// derived ordering sorts by change kind first and field values second.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Change {
    DirectoryAdd {
        path: SyntheticValue,
    },
    DirectoryDelete {
        path: SyntheticValue,
    },
    EnvSet {
        key: SyntheticValue,
        value: SyntheticValue,
    },
    EnvUnset {
        key: SyntheticValue,
    },
    FileAdd {
        path: SyntheticValue,
    },
    FileChange {
        path: SyntheticValue,
        changes: Vec<FileContentChange>,
    },
    FileDelete {
        path: SyntheticValue,
    },
    ServiceStart {
        name: SyntheticValue,
    },
    ServiceStop {
        name: SyntheticValue,
    },
    SymbolicLink {
        path: SyntheticValue,
        link: SyntheticValue,
    },
    WorkingDirectorySet {
        path: SyntheticValue,
    },
}

impl Change {
    pub fn directory_add(path: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::DirectoryAdd {
            path: lift(path, pool),
        }
    }

    pub fn directory_delete(path: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::DirectoryDelete {
            path: lift(path, pool),
        }
    }

    pub fn env_set(
        key: impl Into<Primitive>,
        value: impl Into<Primitive>,
        pool: &BTreeSet<Argument>,
    ) -> Self {
        Self::EnvSet {
            key: lift(key, pool),
            value: lift(value, pool),
        }
    }

    pub fn env_unset(key: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::EnvUnset {
            key: lift(key, pool),
        }
    }

    pub fn file_add(path: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::FileAdd {
            path: lift(path, pool),
        }
    }

    pub fn file_change(
        path: impl Into<Primitive>,
        changes: impl IntoIterator<Item = FileContentChange>,
        pool: &BTreeSet<Argument>,
    ) -> Self {
        Self::FileChange {
            path: lift(path, pool),
            changes: changes
                .into_iter()
                .map(|change| change.from_arguments(pool))
                .collect(),
        }
    }

    pub fn file_delete(path: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::FileDelete {
            path: lift(path, pool),
        }
    }

    pub fn service_start(name: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::ServiceStart {
            name: lift(name, pool),
        }
    }

    pub fn service_stop(name: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::ServiceStop {
            name: lift(name, pool),
        }
    }

    pub fn symbolic_link(
        path: impl Into<Primitive>,
        link: impl Into<Primitive>,
        pool: &BTreeSet<Argument>,
    ) -> Self {
        Self::SymbolicLink {
            path: lift(path, pool),
            link: lift(link, pool),
        }
    }

    pub fn working_directory_set(path: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> Self {
        Self::WorkingDirectorySet {
            path: lift(path, pool),
        }
    }

    /// The change kind's name, used for binning and for the serialized
    /// `type` tag.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::DirectoryAdd { .. } => "DirectoryAdd",
            Self::DirectoryDelete { .. } => "DirectoryDelete",
            Self::EnvSet { .. } => "EnvSet",
            Self::EnvUnset { .. } => "EnvUnset",
            Self::FileAdd { .. } => "FileAdd",
            Self::FileChange { .. } => "FileChange",
            Self::FileDelete { .. } => "FileDelete",
            Self::ServiceStart { .. } => "ServiceStart",
            Self::ServiceStop { .. } => "ServiceStop",
            Self::SymbolicLink { .. } => "SymbolicLink",
            Self::WorkingDirectorySet { .. } => "WorkingDirectorySet",
        }
    }

    /// All arguments appearing in any field of this change.
    pub fn arguments(&self) -> BTreeSet<Argument> {
        let mut arguments = BTreeSet::new();
        for value in self.synthetic_values() {
            arguments.extend(value.arguments().iter().cloned());
        }
        arguments
    }

    fn synthetic_values(&self) -> Vec<&SyntheticValue> {
        match self {
            Self::DirectoryAdd { path }
            | Self::DirectoryDelete { path }
            | Self::FileAdd { path }
            | Self::FileDelete { path }
            | Self::WorkingDirectorySet { path } => vec![path],
            Self::EnvSet { key, value } => vec![key, value],
            Self::EnvUnset { key } => vec![key],
            Self::FileChange { path, changes } => {
                let mut values = vec![path];
                values.extend(changes.iter().map(FileContentChange::content));
                values
            }
            Self::ServiceStart { name } | Self::ServiceStop { name } => vec![name],
            Self::SymbolicLink { path, link } => vec![path, link],
        }
    }

    /// Re-decomposes every field over a new argument pool.
    pub fn from_arguments(&self, pool: &BTreeSet<Argument>) -> Self {
        let relift = |value: &SyntheticValue| {
            SyntheticValue::new(value.original().clone(), pool.iter().cloned())
        };
        match self {
            Self::DirectoryAdd { path } => Self::DirectoryAdd { path: relift(path) },
            Self::DirectoryDelete { path } => Self::DirectoryDelete { path: relift(path) },
            Self::EnvSet { key, value } => Self::EnvSet {
                key: relift(key),
                value: relift(value),
            },
            Self::EnvUnset { key } => Self::EnvUnset { key: relift(key) },
            Self::FileAdd { path } => Self::FileAdd { path: relift(path) },
            Self::FileChange { path, changes } => Self::FileChange {
                path: relift(path),
                changes: changes
                    .iter()
                    .map(|change| change.from_arguments(pool))
                    .collect(),
            },
            Self::FileDelete { path } => Self::FileDelete { path: relift(path) },
            Self::ServiceStart { name } => Self::ServiceStart { name: relift(name) },
            Self::ServiceStop { name } => Self::ServiceStop { name: relift(name) },
            Self::SymbolicLink { path, link } => Self::SymbolicLink {
                path: relift(path),
                link: relift(link),
            },
            Self::WorkingDirectorySet { path } => Self::WorkingDirectorySet { path: relift(path) },
        }
    }

    /// Rebuilds this change with mapped arguments substituted in every
    /// field.
    pub fn from_mapping(&self, mapping: &ArgumentMapping) -> Result<Self, MapError> {
        Ok(match self {
            Self::DirectoryAdd { path } => Self::DirectoryAdd {
                path: path.from_mapping(mapping)?,
            },
            Self::DirectoryDelete { path } => Self::DirectoryDelete {
                path: path.from_mapping(mapping)?,
            },
            Self::EnvSet { key, value } => Self::EnvSet {
                key: key.from_mapping(mapping)?,
                value: value.from_mapping(mapping)?,
            },
            Self::EnvUnset { key } => Self::EnvUnset {
                key: key.from_mapping(mapping)?,
            },
            Self::FileAdd { path } => Self::FileAdd {
                path: path.from_mapping(mapping)?,
            },
            Self::FileChange { path, changes } => Self::FileChange {
                path: path.from_mapping(mapping)?,
                changes: changes
                    .iter()
                    .map(|change| change.from_mapping(mapping))
                    .collect::<Result<_, _>>()?,
            },
            Self::FileDelete { path } => Self::FileDelete {
                path: path.from_mapping(mapping)?,
            },
            Self::ServiceStart { name } => Self::ServiceStart {
                name: name.from_mapping(mapping)?,
            },
            Self::ServiceStop { name } => Self::ServiceStop {
                name: name.from_mapping(mapping)?,
            },
            Self::SymbolicLink { path, link } => Self::SymbolicLink {
                path: path.from_mapping(mapping)?,
                link: link.from_mapping(mapping)?,
            },
            Self::WorkingDirectorySet { path } => Self::WorkingDirectorySet {
                path: path.from_mapping(mapping)?,
            },
        })
    }

    /// All argument mappings that simultaneously align every field of this
    /// change with the corresponding field of `other`.
    ///
    /// Fails with [`MapError::TypeMismatch`] when the changes are of
    /// different kinds. File content changes must align position-wise and
    /// be of equal number; otherwise the result is empty.
    pub fn map_to_other(&self, other: &Self) -> Result<BTreeSet<ArgumentMapping>, MapError> {
        let field_sets: Vec<BTreeSet<ArgumentMapping>> = match (self, other) {
            (Self::DirectoryAdd { path: a }, Self::DirectoryAdd { path: b })
            | (Self::DirectoryDelete { path: a }, Self::DirectoryDelete { path: b })
            | (Self::FileAdd { path: a }, Self::FileAdd { path: b })
            | (Self::FileDelete { path: a }, Self::FileDelete { path: b })
            | (Self::WorkingDirectorySet { path: a }, Self::WorkingDirectorySet { path: b })
            | (Self::EnvUnset { key: a }, Self::EnvUnset { key: b })
            | (Self::ServiceStart { name: a }, Self::ServiceStart { name: b })
            | (Self::ServiceStop { name: a }, Self::ServiceStop { name: b }) => {
                vec![a.map_to_primitive(b.original())?]
            }
            (
                Self::EnvSet { key: a, value: av },
                Self::EnvSet { key: b, value: bv },
            ) => {
                vec![
                    a.map_to_primitive(b.original())?,
                    av.map_to_primitive(bv.original())?,
                ]
            }
            (
                Self::SymbolicLink { path: a, link: al },
                Self::SymbolicLink { path: b, link: bl },
            ) => {
                vec![
                    a.map_to_primitive(b.original())?,
                    al.map_to_primitive(bl.original())?,
                ]
            }
            (
                Self::FileChange {
                    path: a,
                    changes: ca,
                },
                Self::FileChange {
                    path: b,
                    changes: cb,
                },
            ) => {
                if ca.len() != cb.len() {
                    return Ok(BTreeSet::new());
                }
                let mut sets = vec![a.map_to_primitive(b.original())?];
                for (x, y) in zip(ca, cb) {
                    sets.push(x.map_to_other(y)?);
                }
                sets
            }
            _ => {
                return Err(MapError::TypeMismatch {
                    source_kind: self.kind_name(),
                    target: other.kind_name(),
                });
            }
        };
        Ok(ArgumentMapping::all_combinations(field_sets)?)
    }
}

/// Error from the external image differ.
#[derive(Debug, Error)]
#[error("Failed to diff images: {message}")]
pub struct DiffError {
    pub message: String,
}

/// Contract for the external image-diff layer.
///
/// Implementations compare two container images and report the observable
/// configuration differences. All returned changes are concrete: their
/// synthetic fields carry no arguments.
pub trait ImageDiffer {
    fn diff(&self, base: &str, configured: &str) -> Result<ChangeSet, DiffError>;
}

fn lift(value: impl Into<Primitive>, pool: &BTreeSet<Argument>) -> SyntheticValue {
    SyntheticValue::new(value, pool.iter().cloned())
}
