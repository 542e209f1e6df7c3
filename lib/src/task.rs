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

//! Configuration tasks: invocations known to produce a set of changes.
//!
//! A [`Task`] couples an executable and its literal arguments with the
//! changes observed when it ran. Constructing a task extracts its argument
//! pool from the literal arguments and re-decomposes every change over that
//! pool, which is what turns recorded concrete changes into reusable
//! templates.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;

use thiserror::Error;

use crate::argument::Argument;
use crate::argument::Primitive;
use crate::change::ChangeSet;
use crate::intersection::IntersectionOptions;
use crate::intersection::change_intersection;
use crate::mapping::ArgumentMapping;
use crate::synthetic::MapError;
use crate::synthetic::SyntheticValue;

/// A configuration system whose scripts the synthesizer can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum System {
    Shell,
    Docker,
    Ansible,
}

/// A configuration-system tag outside the supported set. Usually indicates
/// knowledge-base corruption.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Unknown configuration system `{0}`")]
pub struct UnknownSystem(pub String);

impl System {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Docker => "docker",
            Self::Ansible => "ansible",
        }
    }
}

impl FromStr for System {
    type Err = UnknownSystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shell" => Ok(Self::Shell),
            "docker" => Ok(Self::Docker),
            "ansible" => Ok(Self::Ansible),
            _ => Err(UnknownSystem(s.to_owned())),
        }
    }
}

impl Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node in the nested argument structure of an Ansible-style task.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArgumentTree {
    Bool(bool),
    Int(i64),
    Str(String),
    Sequence(Vec<ArgumentTree>),
    Mapping(BTreeMap<String, ArgumentTree>),
}

impl ArgumentTree {
    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<Primitive>) {
        match self {
            Self::Bool(v) => leaves.push(Primitive::Bool(*v)),
            Self::Int(v) => leaves.push(Primitive::Int(*v)),
            Self::Str(v) => leaves.push(Primitive::Str(v.clone())),
            Self::Sequence(items) => {
                for item in items {
                    item.collect_leaves(leaves);
                }
            }
            Self::Mapping(entries) => {
                for value in entries.values() {
                    value.collect_leaves(leaves);
                }
            }
        }
    }
}

/// The literal arguments of a task: a flat word sequence for shell and
/// Dockerfile tasks, a nested tree for Ansible tasks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskArguments {
    Sequence(Vec<String>),
    Mapping(BTreeMap<String, ArgumentTree>),
}

impl TaskArguments {
    /// Extracts the argument pool: one [`Argument`] per leaf scalar.
    pub fn argument_pool(&self) -> BTreeSet<Argument> {
        match self {
            Self::Sequence(words) => {
                words.iter().map(|word| Argument::new(word.as_str())).collect()
            }
            Self::Mapping(entries) => {
                let mut leaves = Vec::new();
                for value in entries.values() {
                    value.collect_leaves(&mut leaves);
                }
                leaves.into_iter().map(Argument::new).collect()
            }
        }
    }
}

/// A configuration task: an invocation known to produce a set of changes.
#[derive(Clone, Debug)]
pub struct Task {
    system: System,
    executable: String,
    arguments: TaskArguments,
    changes: ChangeSet,
    argument_pool: BTreeSet<Argument>,
}

impl Task {
    /// Creates a task, extracting the argument pool from `arguments` and
    /// re-decomposing every change over it.
    pub fn new(
        system: System,
        executable: impl Into<String>,
        arguments: TaskArguments,
        changes: ChangeSet,
    ) -> Self {
        let argument_pool = arguments.argument_pool();
        let changes = changes
            .iter()
            .map(|change| change.from_arguments(&argument_pool))
            .collect();
        Self {
            system,
            executable: executable.into(),
            arguments,
            changes,
            argument_pool,
        }
    }

    pub fn system(&self) -> System {
        self.system
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn arguments(&self) -> &TaskArguments {
        &self.arguments
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn argument_pool(&self) -> &BTreeSet<Argument> {
        &self.argument_pool
    }

    /// This task without its changes. Useful when the recorded changes are
    /// not meaningful in the consuming context, e.g. resolving tasks pulled
    /// from the knowledge base.
    pub fn no_changes(&self) -> Self {
        Self::new(
            self.system,
            self.executable.clone(),
            self.arguments.clone(),
            ChangeSet::new(),
        )
    }

    /// Rewrites this task's literal arguments and changes through a
    /// mapping, producing the bound task.
    ///
    /// A leaf equal to a mapped source argument is replaced by the source's
    /// transformer applied to the target value. A leaf equal to some
    /// source's `pre_transform_value` is rewritten the same way through
    /// that source. Any other leaf passes through.
    pub fn from_mapping(&self, mapping: &ArgumentMapping) -> Result<Self, MapError> {
        let mut pool = BTreeSet::new();
        let arguments = match &self.arguments {
            TaskArguments::Sequence(words) => TaskArguments::Sequence(
                words
                    .iter()
                    .map(|word| substitute_leaf(word, mapping, &mut pool))
                    .collect(),
            ),
            TaskArguments::Mapping(entries) => TaskArguments::Mapping(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), substitute_tree(value, mapping, &mut pool)))
                    .collect(),
            ),
        };
        let changes = self
            .changes
            .iter()
            .map(|change| change.from_mapping(mapping))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            system: self.system,
            executable: self.executable.clone(),
            arguments,
            changes,
            argument_pool: pool,
        })
    }

    /// The argument mapping relating this task's changes to another task's
    /// changes, taken from their largest coherent change intersection. May
    /// be empty.
    pub fn map_to_task(&self, other: &Self) -> ArgumentMapping {
        change_intersection(&self.changes, &other.changes, &IntersectionOptions::default())
            .mapping
    }
}

fn substitute_leaf(
    word: &str,
    mapping: &ArgumentMapping,
    pool: &mut BTreeSet<Argument>,
) -> String {
    let leaf = Argument::new(word);
    if let Some(mapped) = mapping.target(&leaf) {
        // The stored source key carries the transformer; the probe above is
        // transformer-less.
        let stored = mapping.source(mapped).expect("mapping is a bijection");
        pool.insert(mapped.clone());
        return stored.transformer().apply(mapped.value());
    }
    for source in mapping.sources() {
        if source.pre_transform_value() == Some(word) {
            let mapped = mapping.target(source).expect("source is mapped");
            pool.insert(mapped.clone());
            return source.transformer().apply(mapped.value());
        }
    }
    pool.insert(leaf);
    word.to_owned()
}

fn substitute_tree(
    tree: &ArgumentTree,
    mapping: &ArgumentMapping,
    pool: &mut BTreeSet<Argument>,
) -> ArgumentTree {
    match tree {
        ArgumentTree::Sequence(items) => ArgumentTree::Sequence(
            items
                .iter()
                .map(|item| substitute_tree(item, mapping, &mut *pool))
                .collect(),
        ),
        ArgumentTree::Mapping(entries) => ArgumentTree::Mapping(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), substitute_tree(value, mapping, &mut *pool)))
                .collect(),
        ),
        ArgumentTree::Str(value) => ArgumentTree::Str(substitute_leaf(value, mapping, pool)),
        ArgumentTree::Bool(v) => {
            substitute_scalar(Primitive::Bool(*v), tree, mapping, pool)
        }
        ArgumentTree::Int(v) => substitute_scalar(Primitive::Int(*v), tree, mapping, pool),
    }
}

fn substitute_scalar(
    scalar: Primitive,
    tree: &ArgumentTree,
    mapping: &ArgumentMapping,
    pool: &mut BTreeSet<Argument>,
) -> ArgumentTree {
    let leaf = Argument::new(scalar);
    if let Some(mapped) = mapping.target(&leaf) {
        let stored = mapping.source(mapped).expect("mapping is a bijection");
        pool.insert(mapped.clone());
        ArgumentTree::Str(stored.transformer().apply(mapped.value()))
    } else {
        pool.insert(leaf);
        tree.clone()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        // The argument pool is derived state and does not participate.
        (&self.system, &self.executable, &self.arguments, &self.changes)
            == (&other.system, &other.executable, &other.arguments, &other.changes)
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.system, &self.executable, &self.arguments, &self.changes).cmp(&(
            &other.system,
            &other.executable,
            &other.arguments,
            &other.changes,
        ))
    }
}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.system.hash(state);
        self.executable.hash(state);
        self.arguments.hash(state);
        self.changes.hash(state);
    }
}

impl Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.system, self.executable)?;
        match &self.arguments {
            TaskArguments::Sequence(words) => {
                for word in words {
                    write!(f, " {word}")?;
                }
            }
            TaskArguments::Mapping(entries) => {
                write!(f, " {entries:?}")?;
            }
        }
        Ok(())
    }
}

/// An error produced by running a configuration task, with its output
/// fields decomposed over the task's argument pool.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskError {
    Shell {
        exit_code: i64,
        stdout: SyntheticValue,
        stderr: SyntheticValue,
    },
    Ansible {
        changed: bool,
        msg: SyntheticValue,
        json_output: SyntheticValue,
    },
}

/// Runner output that cannot be turned into a [`TaskError`].
#[derive(Debug, Error)]
pub enum TaskOutputError {
    #[error("Runner output is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("Runner output is missing the `{0}` field")]
    MissingField(&'static str),
}

impl TaskError {
    pub fn shell(
        exit_code: i64,
        stdout: impl Into<Primitive>,
        stderr: impl Into<Primitive>,
        pool: &BTreeSet<Argument>,
    ) -> Self {
        Self::Shell {
            exit_code,
            stdout: SyntheticValue::new(stdout, pool.iter().cloned()),
            stderr: SyntheticValue::new(stderr, pool.iter().cloned()),
        }
    }

    pub fn ansible(
        changed: bool,
        msg: impl Into<Primitive>,
        json_output: impl Into<Primitive>,
        pool: &BTreeSet<Argument>,
    ) -> Self {
        Self::Ansible {
            changed,
            msg: SyntheticValue::new(msg, pool.iter().cloned()),
            json_output: SyntheticValue::new(json_output, pool.iter().cloned()),
        }
    }

    /// Builds an Ansible error from the runner's raw JSON output.
    pub fn ansible_from_json(
        raw: &str,
        pool: &BTreeSet<Argument>,
    ) -> Result<Self, TaskOutputError> {
        let parsed: serde_json::Value = serde_json::from_str(raw)?;
        let changed = parsed
            .get("changed")
            .and_then(serde_json::Value::as_bool)
            .ok_or(TaskOutputError::MissingField("changed"))?;
        let msg = parsed
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .ok_or(TaskOutputError::MissingField("msg"))?;
        Ok(Self::ansible(changed, msg, raw, pool))
    }

    pub fn system(&self) -> System {
        match self {
            Self::Shell { .. } => System::Shell,
            Self::Ansible { .. } => System::Ansible,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Shell { .. } => "ShellError",
            Self::Ansible { .. } => "AnsibleError",
        }
    }

    /// Re-decomposes the output fields over a new argument pool.
    pub fn from_arguments(&self, pool: &BTreeSet<Argument>) -> Self {
        let relift = |value: &SyntheticValue| {
            SyntheticValue::new(value.original().clone(), pool.iter().cloned())
        };
        match self {
            Self::Shell {
                exit_code,
                stdout,
                stderr,
            } => Self::Shell {
                exit_code: *exit_code,
                stdout: relift(stdout),
                stderr: relift(stderr),
            },
            Self::Ansible {
                changed,
                msg,
                json_output,
            } => Self::Ansible {
                changed: *changed,
                msg: relift(msg),
                json_output: relift(json_output),
            },
        }
    }

    pub fn from_mapping(&self, mapping: &ArgumentMapping) -> Result<Self, MapError> {
        Ok(match self {
            Self::Shell {
                exit_code,
                stdout,
                stderr,
            } => Self::Shell {
                exit_code: *exit_code,
                stdout: stdout.from_mapping(mapping)?,
                stderr: stderr.from_mapping(mapping)?,
            },
            Self::Ansible {
                changed,
                msg,
                json_output,
            } => Self::Ansible {
                changed: *changed,
                msg: msg.from_mapping(mapping)?,
                json_output: json_output.from_mapping(mapping)?,
            },
        })
    }

    /// All argument mappings aligning this error with another of the same
    /// kind. Primitive fields must be equal.
    pub fn map_to_other(&self, other: &Self) -> Result<BTreeSet<ArgumentMapping>, MapError> {
        let field_sets = match (self, other) {
            (
                Self::Shell {
                    exit_code: a_code,
                    stdout: a_out,
                    stderr: a_err,
                },
                Self::Shell {
                    exit_code: b_code,
                    stdout: b_out,
                    stderr: b_err,
                },
            ) => {
                if a_code != b_code {
                    return Ok(BTreeSet::new());
                }
                vec![
                    a_out.map_to_primitive(b_out.original())?,
                    a_err.map_to_primitive(b_err.original())?,
                ]
            }
            (
                Self::Ansible {
                    changed: a_changed,
                    msg: a_msg,
                    json_output: a_json,
                },
                Self::Ansible {
                    changed: b_changed,
                    msg: b_msg,
                    json_output: b_json,
                },
            ) => {
                if a_changed != b_changed {
                    return Ok(BTreeSet::new());
                }
                vec![
                    a_msg.map_to_primitive(b_msg.original())?,
                    a_json.map_to_primitive(b_json.original())?,
                ]
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

impl Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell {
                exit_code, stderr, ..
            } => write!(f, "{exit_code}: {stderr}"),
            Self::Ansible { msg, .. } => write!(f, "{msg}"),
        }
    }
}
