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

use maplit::btreeset;
use refab_lib::change::ChangeSet;
use refab_lib::change::ContentChangeKind;
use refab_lib::intersection::IntersectionMode;
use refab_lib::intersection::IntersectionOptions;
use refab_lib::intersection::change_intersection;
use refab_lib::mapping::ArgumentMapping;
use testutils::directory_add;
use testutils::env_set;
use testutils::file_add;
use testutils::file_change;
use testutils::mapping_of;
use testutils::shell_task;

#[test]
fn test_empty_inputs_yield_empty_triple() {
    let options = IntersectionOptions::default();
    let some = btreeset! {file_add("x.txt")};
    for (source, target) in [
        (ChangeSet::new(), ChangeSet::new()),
        (some.clone(), ChangeSet::new()),
        (ChangeSet::new(), some),
    ] {
        let result = change_intersection(&source, &target, &options);
        assert!(result.is_empty());
        assert!(result.mapping.is_empty());
    }
}

#[test]
fn test_install_tree_binds_once() {
    // One task template whose changes all mention the same two holes; the
    // target is the concrete footprint of a different installation. All
    // changes must map under one coherent binding.
    let template = shell_task(
        "install-tool",
        &["tool", "1.2.3"],
        btreeset! {
            directory_add("/opt/tool"),
            directory_add("/opt/tool/1.2.3"),
            file_add("/opt/tool/1.2.3/bin/tool"),
            env_set("TOOL_VERSION", "1.2.3"),
        },
    );
    let target = btreeset! {
        directory_add("/opt/gcc"),
        directory_add("/opt/gcc/13.2.0"),
        file_add("/opt/gcc/13.2.0/bin/gcc"),
        env_set("TOOL_VERSION", "13.2.0"),
    };
    let result = change_intersection(template.changes(), &target, &IntersectionOptions::default());
    assert_eq!(result.source, *template.changes());
    assert_eq!(result.target, target);
    assert_eq!(
        result.mapping,
        mapping_of(&[("tool", "gcc"), ("1.2.3", "13.2.0")])
    );
}

#[test]
fn test_git_head_swap() {
    // The recorded clone produced one commit hash; the target image has
    // another. The two content rows must align position-wise and bind the
    // hash holes to each other.
    let template = shell_task(
        "git-checkout",
        &["4f20cbd4"],
        btreeset! {file_change(
            ".git/HEAD",
            &[
                (ContentChangeKind::Addition, "4f20cbd4\n"),
                (ContentChangeKind::Deletion, "ref: refs/heads/master\n"),
            ],
        )},
    );
    let target = btreeset! {file_change(
        ".git/HEAD",
        &[
            (ContentChangeKind::Addition, "9b71afe2\n"),
            (ContentChangeKind::Deletion, "ref: refs/heads/master\n"),
        ],
    )};
    let result = change_intersection(template.changes(), &target, &IntersectionOptions::default());
    assert_eq!(result.source, *template.changes());
    assert_eq!(result.target, target);
    assert_eq!(result.mapping, mapping_of(&[("4f20cbd4", "9b71afe2")]));
}

#[test]
fn test_exact_mode_is_set_intersection() {
    let options = IntersectionOptions {
        mode: IntersectionMode::Exact,
        ..IntersectionOptions::default()
    };
    let shared = btreeset! {file_add("common.txt"), directory_add("/shared")};
    let source: ChangeSet = shared
        .iter()
        .cloned()
        .chain([file_add("only-source.txt")])
        .collect();
    let target: ChangeSet = shared
        .iter()
        .cloned()
        .chain([file_add("only-target.txt")])
        .collect();
    let result = change_intersection(&source, &target, &options);
    assert_eq!(result.source, shared);
    assert_eq!(result.target, shared);
    assert_eq!(result.mapping, ArgumentMapping::new());
}

#[test]
fn test_exact_mode_disjoint_sets() {
    let options = IntersectionOptions {
        mode: IntersectionMode::Exact,
        ..IntersectionOptions::default()
    };
    let source = btreeset! {file_add("a.txt")};
    let target = btreeset! {file_add("b.txt")};
    assert!(change_intersection(&source, &target, &options).is_empty());
}

#[test]
fn test_truncation_keeps_most_frequent_binding() {
    // With the per-argument cap at one mapping, only the binding seen most
    // often survives node selection.
    let options = IntersectionOptions {
        mappings_per_argument: 1,
        ..IntersectionOptions::default()
    };
    let template = shell_task(
        "provision",
        &["svc"],
        btreeset! {
            directory_add("/etc/svc"),
            directory_add("/var/log/svc"),
            file_add("/etc/svc/config"),
        },
    );
    // `nginx` fits all three changes; `apache` only one.
    let target = btreeset! {
        directory_add("/etc/nginx"),
        directory_add("/var/log/nginx"),
        file_add("/etc/nginx/config"),
        file_add("/etc/apache/config"),
    };
    let result = change_intersection(template.changes(), &target, &options);
    assert_eq!(result.mapping, mapping_of(&[("svc", "nginx")]));
    assert_eq!(result.source.len(), 3);
    assert_eq!(result.target.len(), 3);
}

#[test]
fn test_external_cancellation_collapses_to_empty() {
    use std::time::Duration;

    use refab_lib::deadline::with_deadline;

    let template = shell_task(
        "install-tool",
        &["tool"],
        btreeset! {directory_add("/opt/tool")},
    );
    let target = btreeset! {directory_add("/opt/gcc")};
    let result = with_deadline(Duration::ZERO, || {
        change_intersection(template.changes(), &target, &IntersectionOptions::default())
    })
    .unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_deterministic_output() {
    let template = shell_task(
        "madlibs",
        &["fox", "dog"],
        btreeset! {
            file_change("1.txt", &[(ContentChangeKind::Addition, "+fox+dog+")]),
            file_change("2.txt", &[(ContentChangeKind::Addition, "+dog+fox+")]),
        },
    );
    let target = btreeset! {
        file_change("1.txt", &[(ContentChangeKind::Addition, "+vulpine+++canine+")]),
        file_change("2.txt", &[(ContentChangeKind::Addition, "++canine+vulpine++")]),
    };
    let options = IntersectionOptions::default();
    let first = change_intersection(template.changes(), &target, &options);
    for _ in 0..5 {
        assert_eq!(
            change_intersection(template.changes(), &target, &options),
            first
        );
    }
    // Both content rows agree on exactly one binding.
    assert_eq!(
        first.mapping,
        mapping_of(&[("fox", "vulpine+"), ("dog", "+canine")])
    );
    assert_eq!(first.source.len(), 2);
}
