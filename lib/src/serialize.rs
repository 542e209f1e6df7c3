// Copyright 2025 The Refab Authors
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

//! Stable JSON encoding for knowledge-base storage and transport.
//!
//! Every entity encodes as a tagged document `{"type": Name, "value":
//! {...}}` with keys sorted, synthetic values flattened to their original
//! scalars, and sets emitted in sorted order, so that encoding is
//! byte-stable: decode followed by re-encode reproduces the input bytes.
//! Argument holes are not serialized; decoding a task re-derives them from
//! the task's own literal arguments.

use std::collections::BTreeSet;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::argument::Argument;
use crate::argument::Primitive;
use crate::change::Change;
use crate::change::ChangeSet;
use crate::change::ContentChangeKind;
use crate::change::FileContentChange;
use crate::knowledge_base::TaskExecution;
use crate::synthetic::SyntheticValue;
use crate::task::ArgumentTree;
use crate::task::System;
use crate::task::Task;
use crate::task::TaskArguments;
use crate::task::TaskError;
use crate::task::UnknownSystem;

/// Error from decoding a stored document.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The document is not parseable JSON.
    #[error("Invalid JSON")]
    Json(#[from] serde_json::Error),
    /// A `type` tag names no known variant.
    #[error("Unknown variant tag `{0}`")]
    UnknownVariant(String),
    /// A system tag outside the supported set.
    #[error(transparent)]
    UnknownSystem(#[from] UnknownSystem),
    /// Task arguments that are neither a sequence nor a mapping.
    #[error("Task arguments must be a sequence or a mapping")]
    InvalidOperand,
    /// Any other shape violation.
    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Encodes a task to its stable string form.
pub fn encode_task(task: &Task) -> String {
    task_to_value(task).to_string()
}

/// Decodes a task from its string form, re-deriving the argument pool from
/// the task's literal arguments.
pub fn decode_task(encoded: &str) -> Result<Task, CodecError> {
    task_from_value(&serde_json::from_str(encoded)?)
}

/// Encodes a task as a tagged JSON document.
pub fn task_to_value(task: &Task) -> Value {
    let arguments = match task.arguments() {
        TaskArguments::Sequence(words) => json!(words),
        TaskArguments::Mapping(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), tree_to_value(value)))
                .collect(),
        ),
    };
    json!({
        "type": "Task",
        "value": {
            "arguments": arguments,
            "changes": task.changes().iter().map(change_to_value).collect::<Vec<_>>(),
            "executable": task.executable(),
            "system": task.system().as_str(),
        },
    })
}

/// Decodes a task document.
pub fn task_from_value(value: &Value) -> Result<Task, CodecError> {
    let body = tagged_value(value, "Task")?;
    let system: System = required_str(body, "system")?.parse()?;
    let executable = required_str(body, "executable")?;
    let arguments = match body.get("arguments") {
        Some(Value::Array(words)) => TaskArguments::Sequence(
            words
                .iter()
                .map(|word| {
                    word.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| CodecError::Malformed("non-string argument word".into()))
                })
                .collect::<Result<_, _>>()?,
        ),
        Some(Value::Object(entries)) => TaskArguments::Mapping(
            entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), tree_from_value(value)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
        _ => return Err(CodecError::InvalidOperand),
    };
    let empty_pool = BTreeSet::new();
    let changes: ChangeSet = match body.get("changes") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| change_from_value(item, &empty_pool))
            .collect::<Result<_, _>>()?,
        None => ChangeSet::new(),
        Some(_) => return Err(CodecError::Malformed("changes must be an array".into())),
    };
    Ok(Task::new(system, executable, arguments, changes))
}

/// Encodes a change as a tagged JSON document.
pub fn change_to_value(change: &Change) -> Value {
    let body = match change {
        Change::DirectoryAdd { path }
        | Change::DirectoryDelete { path }
        | Change::FileAdd { path }
        | Change::FileDelete { path }
        | Change::WorkingDirectorySet { path } => json!({"path": synthetic_to_value(path)}),
        Change::EnvSet { key, value } => json!({
            "key": synthetic_to_value(key),
            "value": synthetic_to_value(value),
        }),
        Change::EnvUnset { key } => json!({"key": synthetic_to_value(key)}),
        Change::FileChange { path, changes } => json!({
            "changes": changes.iter().map(content_change_to_value).collect::<Vec<_>>(),
            "path": synthetic_to_value(path),
        }),
        Change::ServiceStart { name } | Change::ServiceStop { name } => {
            json!({"name": synthetic_to_value(name)})
        }
        Change::SymbolicLink { path, link } => json!({
            "link": synthetic_to_value(link),
            "path": synthetic_to_value(path),
        }),
    };
    json!({"type": change.kind_name(), "value": body})
}

/// Decodes a change document, decomposing its fields over `pool`.
pub fn change_from_value(
    value: &Value,
    pool: &BTreeSet<Argument>,
) -> Result<Change, CodecError> {
    let tag = required_str(value, "type")?;
    let body = value
        .get("value")
        .ok_or_else(|| CodecError::Malformed("missing `value`".into()))?;
    let change = match tag.as_str() {
        "DirectoryAdd" => Change::directory_add(required_primitive(body, "path")?, pool),
        "DirectoryDelete" => Change::directory_delete(required_primitive(body, "path")?, pool),
        "EnvSet" => Change::env_set(
            required_primitive(body, "key")?,
            required_primitive(body, "value")?,
            pool,
        ),
        "EnvUnset" => Change::env_unset(required_primitive(body, "key")?, pool),
        "FileAdd" => Change::file_add(required_primitive(body, "path")?, pool),
        "FileChange" => {
            let rows = match body.get("changes") {
                Some(Value::Array(rows)) => rows
                    .iter()
                    .map(|row| content_change_from_value(row, pool))
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(CodecError::Malformed("missing content changes".into())),
            };
            Change::file_change(required_primitive(body, "path")?, rows, pool)
        }
        "FileDelete" => Change::file_delete(required_primitive(body, "path")?, pool),
        "ServiceStart" => Change::service_start(required_primitive(body, "name")?, pool),
        "ServiceStop" => Change::service_stop(required_primitive(body, "name")?, pool),
        "SymbolicLink" => Change::symbolic_link(
            required_primitive(body, "path")?,
            required_primitive(body, "link")?,
            pool,
        ),
        "WorkingDirectorySet" => {
            Change::working_directory_set(required_primitive(body, "path")?, pool)
        }
        _ => return Err(CodecError::UnknownVariant(tag)),
    };
    Ok(change)
}

/// Encodes a task error as a tagged JSON document.
pub fn error_to_value(error: &TaskError) -> Value {
    let body = match error {
        TaskError::Shell {
            exit_code,
            stdout,
            stderr,
        } => json!({
            "exit_code": exit_code,
            "stderr": synthetic_to_value(stderr),
            "stdout": synthetic_to_value(stdout),
        }),
        TaskError::Ansible {
            changed,
            msg,
            json_output,
        } => json!({
            "changed": changed,
            "json_output": synthetic_to_value(json_output),
            "msg": synthetic_to_value(msg),
        }),
    };
    json!({"type": error.kind_name(), "value": body})
}

/// Decodes a task-error document, decomposing its fields over `pool`.
pub fn error_from_value(
    value: &Value,
    pool: &BTreeSet<Argument>,
) -> Result<TaskError, CodecError> {
    let tag = required_str(value, "type")?;
    let body = value
        .get("value")
        .ok_or_else(|| CodecError::Malformed("missing `value`".into()))?;
    match tag.as_str() {
        "ShellError" => {
            let exit_code = body
                .get("exit_code")
                .and_then(Value::as_i64)
                .ok_or_else(|| CodecError::Malformed("missing `exit_code`".into()))?;
            Ok(TaskError::shell(
                exit_code,
                required_primitive(body, "stdout")?,
                required_primitive(body, "stderr")?,
                pool,
            ))
        }
        "AnsibleError" => {
            let changed = body
                .get("changed")
                .and_then(Value::as_bool)
                .ok_or_else(|| CodecError::Malformed("missing `changed`".into()))?;
            Ok(TaskError::ansible(
                changed,
                required_primitive(body, "msg")?,
                required_primitive(body, "json_output")?,
                pool,
            ))
        }
        _ => Err(CodecError::UnknownVariant(tag)),
    }
}

/// Encodes one knowledge-base row.
pub fn execution_to_value(execution: &TaskExecution) -> Value {
    json!({
        "error": execution.error.as_ref().map(error_to_value),
        "id": execution.id,
        "level": execution.level,
        "resolving_tasks": execution
            .resolving_tasks
            .as_ref()
            .map(|tasks| tasks.iter().map(task_to_value).collect::<Vec<_>>()),
        "system": execution.system.as_str(),
        "task": task_to_value(&execution.task),
    })
}

/// Decodes one knowledge-base row.
pub fn execution_from_value(value: &Value) -> Result<TaskExecution, CodecError> {
    let id = value
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| CodecError::Malformed("missing `id`".into()))?;
    let system: System = required_str(value, "system")?.parse()?;
    let level = match value.get("level") {
        None | Some(Value::Null) => None,
        Some(level) => Some(
            level
                .as_i64()
                .ok_or_else(|| CodecError::Malformed("non-integer level".into()))?,
        ),
    };
    let task = task_from_value(
        value
            .get("task")
            .ok_or_else(|| CodecError::Malformed("missing `task`".into()))?,
    )?;
    let empty_pool = BTreeSet::new();
    let error = match value.get("error") {
        None | Some(Value::Null) => None,
        Some(error) => Some(error_from_value(error, &empty_pool)?),
    };
    let resolving_tasks = match value.get("resolving_tasks") {
        None | Some(Value::Null) => None,
        Some(Value::Array(tasks)) => Some(
            tasks
                .iter()
                .map(task_from_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(_) => {
            return Err(CodecError::Malformed(
                "resolving_tasks must be an array".into(),
            ));
        }
    };
    Ok(TaskExecution {
        id,
        system,
        level,
        task,
        error,
        resolving_tasks,
    })
}

fn content_change_to_value(change: &FileContentChange) -> Value {
    json!({
        "type": "FileContentChange",
        "value": {
            "change_type": change.kind().as_str(),
            "content": synthetic_to_value(change.content()),
        },
    })
}

fn content_change_from_value(
    value: &Value,
    pool: &BTreeSet<Argument>,
) -> Result<FileContentChange, CodecError> {
    let body = tagged_value(value, "FileContentChange")?;
    let kind = match required_str(body, "change_type")?.as_str() {
        "addition" => ContentChangeKind::Addition,
        "deletion" => ContentChangeKind::Deletion,
        other => return Err(CodecError::UnknownVariant(other.to_owned())),
    };
    Ok(FileContentChange::new(
        kind,
        required_primitive(body, "content")?,
        pool,
    ))
}

/// A synthetic value serializes as its original scalar only; the holes are
/// recovered on decode from the enclosing task's arguments.
fn synthetic_to_value(value: &SyntheticValue) -> Value {
    primitive_to_value(value.original())
}

fn primitive_to_value(primitive: &Primitive) -> Value {
    match primitive {
        Primitive::Bool(v) => json!(v),
        Primitive::Int(v) => json!(v),
        Primitive::Str(v) => json!(v),
    }
}

fn primitive_from_value(value: &Value) -> Result<Primitive, CodecError> {
    match value {
        Value::Bool(v) => Ok(Primitive::Bool(*v)),
        Value::Number(number) => number
            .as_i64()
            .map(Primitive::Int)
            .ok_or_else(|| CodecError::Malformed(format!("non-integer number `{number}`"))),
        Value::String(v) => Ok(Primitive::Str(v.clone())),
        _ => Err(CodecError::Malformed(format!("not a scalar: `{value}`"))),
    }
}

fn tree_to_value(tree: &ArgumentTree) -> Value {
    match tree {
        ArgumentTree::Bool(v) => json!(v),
        ArgumentTree::Int(v) => json!(v),
        ArgumentTree::Str(v) => json!(v),
        ArgumentTree::Sequence(items) => Value::Array(items.iter().map(tree_to_value).collect()),
        ArgumentTree::Mapping(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), tree_to_value(value)))
                .collect(),
        ),
    }
}

fn tree_from_value(value: &Value) -> Result<ArgumentTree, CodecError> {
    match value {
        Value::Bool(v) => Ok(ArgumentTree::Bool(*v)),
        Value::Number(number) => number
            .as_i64()
            .map(ArgumentTree::Int)
            .ok_or_else(|| CodecError::Malformed(format!("non-integer number `{number}`"))),
        Value::String(v) => Ok(ArgumentTree::Str(v.clone())),
        Value::Array(items) => Ok(ArgumentTree::Sequence(
            items.iter().map(tree_from_value).collect::<Result<_, _>>()?,
        )),
        Value::Object(entries) => Ok(ArgumentTree::Mapping(
            entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), tree_from_value(value)?)))
                .collect::<Result<_, CodecError>>()?,
        )),
        Value::Null => Err(CodecError::Malformed("null argument value".into())),
    }
}

fn tagged_value<'a>(value: &'a Value, expected: &str) -> Result<&'a Value, CodecError> {
    let tag = required_str(value, "type")?;
    if tag != expected {
        return Err(CodecError::UnknownVariant(tag));
    }
    value
        .get("value")
        .ok_or_else(|| CodecError::Malformed("missing `value`".into()))
}

fn required_str(value: &Value, field: &str) -> Result<String, CodecError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| CodecError::Malformed(format!("missing `{field}`")))
}

fn required_primitive(value: &Value, field: &str) -> Result<Primitive, CodecError> {
    primitive_from_value(
        value
            .get(field)
            .ok_or_else(|| CodecError::Malformed(format!("missing `{field}`")))?,
    )
}
