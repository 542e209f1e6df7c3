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

use std::collections::BTreeSet;

use maplit::btreeset;
use refab_lib::knowledge_base::KnowledgeBase;
use refab_lib::mapping::ArgumentMapping;
use refab_lib::simple_store::SimpleStore;
use refab_lib::task::System;
use refab_lib::task::TaskArguments;
use testutils::UnavailableStore;
use testutils::file_add;
use testutils::file_delete;
use testutils::shell_error;
use testutils::shell_task;
use testutils::temp_store;

#[test]
fn test_candidates_from_file_backed_store() {
    let (dir, mut store) = temp_store();
    let touch = shell_task("touch", &["a.txt"], btreeset! {file_add("a.txt")});
    let mkdir = shell_task("mkdir", &["build"], BTreeSet::new());
    store.insert(Some(1), touch.clone(), None, None).unwrap();
    store.insert(Some(1), touch.clone(), None, None).unwrap();
    store.insert(Some(2), mkdir.clone(), None, None).unwrap();

    // Queries work identically against a reloaded store.
    let reloaded = SimpleStore::load(store.path()).unwrap();
    drop(store);
    let kb = KnowledgeBase::new(Box::new(reloaded));
    assert_eq!(
        kb.candidate_tasks(System::Shell, Some(1)),
        btreeset! {touch.clone()}
    );
    assert_eq!(
        kb.candidate_tasks(System::Shell, None),
        btreeset! {touch, mkdir}
    );
    assert_eq!(kb.candidate_tasks(System::Ansible, None), BTreeSet::new());
    drop(dir);
}

#[test]
fn test_level_less_rows_match_every_level() {
    let (_dir, mut store) = temp_store();
    let anywhere = shell_task("ln", &["-s", "a", "b"], BTreeSet::new());
    store.insert(None, anywhere.clone(), None, None).unwrap();

    let kb = KnowledgeBase::new(Box::new(store));
    for level in [Some(0), Some(1), Some(7), None] {
        assert_eq!(
            kb.candidate_tasks(System::Shell, level),
            btreeset! {anywhere.clone()}
        );
    }
}

#[test]
fn test_resolving_round_trip_through_store() {
    let (_dir, mut store) = temp_store();
    let rm = shell_task(
        "rm",
        &["file.txt"],
        btreeset! {file_delete("file.txt")},
    );
    let failure = shell_error(1, "", "rm: file.txt: No such file or directory", &rm);
    let touch = shell_task("touch", &["file.txt"], btreeset! {file_add("file.txt")});
    store
        .insert(Some(1), rm.clone(), Some(failure), Some(vec![touch]))
        .unwrap();

    let reloaded = SimpleStore::load(store.path()).unwrap();
    let kb = KnowledgeBase::new(Box::new(reloaded));

    // Exact query: the stored resolution applies with the empty mapping.
    let query_error = shell_error(1, "", "rm: file.txt: No such file or directory", &rm);
    let resolved = kb.resolving_tasks(&rm, &query_error);
    assert_eq!(resolved.len(), 1);
    let (resolving_task, mapping) = &resolved[0];
    assert_eq!(resolving_task.executable(), "touch");
    assert_eq!(resolving_task.changes(), &BTreeSet::new());
    assert_eq!(*mapping, ArgumentMapping::new());

    // Mapped query: a renamed file reaches the same resolution through the
    // derived binding, and the inverse mapping rewrites the resolving task.
    let other_rm = shell_task(
        "rm",
        &["trace.log"],
        btreeset! {file_delete("trace.log")},
    );
    let other_error = shell_error(1, "", "rm: trace.log: No such file or directory", &other_rm);
    let resolved = kb.resolving_tasks(&other_rm, &other_error);
    assert_eq!(resolved.len(), 1);
    let (resolving_task, mapping) = &resolved[0];
    let rewritten = resolving_task.from_mapping(mapping).unwrap();
    assert_eq!(
        rewritten.arguments(),
        &TaskArguments::Sequence(vec!["trace.log".to_owned()])
    );
}

#[test]
fn test_mismatched_error_resolves_nothing() {
    let (_dir, mut store) = temp_store();
    let rm = shell_task("rm", &["file.txt"], btreeset! {file_delete("file.txt")});
    let failure = shell_error(1, "", "rm: file.txt: No such file or directory", &rm);
    let touch = shell_task("touch", &["file.txt"], btreeset! {file_add("file.txt")});
    store
        .insert(Some(1), rm.clone(), Some(failure), Some(vec![touch]))
        .unwrap();

    let kb = KnowledgeBase::new(Box::new(store));
    let different_error = shell_error(13, "", "rm: file.txt: Permission denied", &rm);
    assert_eq!(kb.resolving_tasks(&rm, &different_error), Vec::new());
}

#[test]
fn test_unavailable_store_degrades_to_empty() {
    let kb = KnowledgeBase::new(Box::new(UnavailableStore));
    assert_eq!(kb.candidate_tasks(System::Shell, Some(1)), BTreeSet::new());

    let rm = shell_task("rm", &["file.txt"], BTreeSet::new());
    let error = shell_error(1, "", "boom", &rm);
    assert_eq!(kb.resolving_tasks(&rm, &error), Vec::new());
}
