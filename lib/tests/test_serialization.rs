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

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use maplit::btreemap;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use refab_lib::change::ContentChangeKind;
use refab_lib::serialize::decode_task;
use refab_lib::serialize::encode_task;
use refab_lib::serialize::error_from_value;
use refab_lib::serialize::error_to_value;
use refab_lib::task::ArgumentTree;
use refab_lib::task::System;
use refab_lib::task::Task;
use refab_lib::task::TaskArguments;
use refab_lib::task::TaskError;
use testutils::directory_add;
use testutils::env_set;
use testutils::file_add;
use testutils::file_change;
use testutils::mapping_of;
use testutils::shell_task;

fn ansible_install() -> Task {
    Task::new(
        System::Ansible,
        "community.general.npm",
        TaskArguments::Mapping(btreemap! {
            "npm".to_owned() => ArgumentTree::Mapping(btreemap! {
                "name".to_owned() => ArgumentTree::Str("left-pad".to_owned()),
                "version".to_owned() => ArgumentTree::Str("1.3.0".to_owned()),
                "global".to_owned() => ArgumentTree::Bool(true),
            }),
        }),
        btreeset! {
            directory_add("/usr/lib/node_modules/left-pad"),
            file_add("/usr/lib/node_modules/left-pad/package.json"),
        },
    )
}

#[test]
fn test_shell_task_round_trip() {
    let task = shell_task(
        "git-clone",
        &["https://example.com/repo.git", "repo"],
        btreeset! {
            directory_add("repo"),
            file_change(
                "repo/.git/HEAD",
                &[(ContentChangeKind::Addition, "ref: refs/heads/master\n")],
            ),
        },
    );
    let decoded = decode_task(&encode_task(&task)).unwrap();
    assert_eq!(decoded, task);
    assert_eq!(decoded.argument_pool(), task.argument_pool());
    assert_eq!(decoded.changes(), task.changes());
}

#[test]
fn test_ansible_task_round_trip() {
    let task = ansible_install();
    let decoded = decode_task(&encode_task(&task)).unwrap();
    assert_eq!(decoded, task);
    // The version argument and its decomposition survive the trip.
    let change = decoded
        .changes()
        .iter()
        .find(|change| change.kind_name() == "DirectoryAdd")
        .unwrap();
    assert!(
        change
            .arguments()
            .iter()
            .any(|argument| argument.value() == "left-pad")
    );
}

#[test]
fn test_encode_decode_encode_is_identity() {
    for task in [
        ansible_install(),
        shell_task("true", &[], BTreeSet::new()),
        shell_task(
            "export",
            &["PATH", "/opt/tool/bin"],
            btreeset! {env_set("PATH", "/opt/tool/bin")},
        ),
    ] {
        let encoded = encode_task(&task);
        assert_eq!(encode_task(&decode_task(&encoded).unwrap()), encoded);
    }
}

#[test]
fn test_changes_encode_sorted() {
    let task = shell_task(
        "setup",
        &[],
        btreeset! {
            file_add("b.txt"),
            file_add("a.txt"),
            directory_add("z"),
        },
    );
    let encoded = encode_task(&task);
    // Sets serialize in their canonical order: kind first, fields second.
    let dir = encoded.find("DirectoryAdd").unwrap();
    let file_a = encoded.find("a.txt").unwrap();
    let file_b = encoded.find("b.txt").unwrap();
    assert!(dir < file_a);
    assert!(file_a < file_b);
}

#[test]
fn test_mapped_task_round_trip() {
    let template = shell_task(
        "touch",
        &["file.txt"],
        btreeset! {file_add("file.txt")},
    );
    let bound = template
        .from_mapping(&mapping_of(&[("file.txt", "x.txt")]))
        .unwrap();
    let decoded = decode_task(&encode_task(&bound)).unwrap();
    assert_eq!(decoded, bound);
}

#[test]
fn test_error_round_trip_with_pool() {
    let task = shell_task("rm", &["file.txt"], BTreeSet::new());
    let error = TaskError::shell(
        1,
        "",
        "rm: file.txt: No such file or directory",
        task.argument_pool(),
    );
    let value = error_to_value(&error);
    let decoded = error_from_value(&value, task.argument_pool()).unwrap();
    assert_eq!(decoded, error);
}

#[test]
fn test_arguments_shape_is_preserved() {
    // A sequence of words and a one-entry mapping must not collapse into
    // each other across the trip.
    let sequence = shell_task("echo", &["hello"], BTreeSet::new());
    let mapping = Task::new(
        System::Ansible,
        "command",
        TaskArguments::Mapping(btreemap! {
            "cmd".to_owned() => ArgumentTree::Str("echo hello".to_owned()),
        }),
        BTreeSet::new(),
    );
    let decoded_sequence = decode_task(&encode_task(&sequence)).unwrap();
    let decoded_mapping = decode_task(&encode_task(&mapping)).unwrap();
    assert!(matches!(
        decoded_sequence.arguments(),
        TaskArguments::Sequence(_)
    ));
    assert!(matches!(
        decoded_mapping.arguments(),
        TaskArguments::Mapping(entries) if entries.len() == 1
    ));
    assert_eq!(decoded_sequence, sequence);
    assert_eq!(decoded_mapping, mapping);
}

#[test]
fn test_nested_sequences_round_trip() {
    let task = Task::new(
        System::Ansible,
        "apt",
        TaskArguments::Mapping(btreemap! {
            "apt".to_owned() => ArgumentTree::Mapping(btreemap! {
                "name".to_owned() => ArgumentTree::Sequence(vec![
                    ArgumentTree::Str("nginx".to_owned()),
                    ArgumentTree::Str("curl".to_owned()),
                ]),
                "install_recommends".to_owned() => ArgumentTree::Bool(false),
                "retries".to_owned() => ArgumentTree::Int(3),
            }),
        }),
        BTreeSet::new(),
    );
    let decoded = decode_task(&encode_task(&task)).unwrap();
    assert_eq!(decoded, task);
    let TaskArguments::Mapping(entries) = decoded.arguments() else {
        panic!("expected mapping arguments");
    };
    let expected: BTreeMap<String, ArgumentTree> = match task.arguments() {
        TaskArguments::Mapping(entries) => entries.clone(),
        TaskArguments::Sequence(_) => unreachable!(),
    };
    assert_eq!(*entries, expected);
}
