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
use std::hint::black_box;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use refab_lib::argument::Argument;
use refab_lib::argument::Primitive;
use refab_lib::change::Change;
use refab_lib::change::ChangeSet;
use refab_lib::intersection::IntersectionOptions;
use refab_lib::intersection::change_intersection;
use refab_lib::synthetic::SyntheticValue;

fn decompose_pool(size: usize) -> BTreeSet<Argument> {
    (0..size)
        .map(|i| Argument::new(format!("segment-{i}")))
        .collect()
}

fn bench_decompose(c: &mut Criterion) {
    let pool = decompose_pool(20);
    let text = (0..20)
        .map(|i| format!("/opt/segment-{i}"))
        .collect::<Vec<_>>()
        .join("");
    c.bench_function("decompose_long_path", |b| {
        b.iter(|| {
            black_box(SyntheticValue::new(
                black_box(text.as_str()),
                pool.iter().cloned(),
            ))
        });
    });
}

fn bench_alignment(c: &mut Criterion) {
    let pool: BTreeSet<Argument> = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(Argument::new)
        .collect();
    let value = SyntheticValue::new(
        "install alpha beta gamma into /srv/alpha/beta",
        pool.iter().cloned(),
    );
    let target = Primitive::from("install one two three into /srv/one/two");
    c.bench_function("align_three_holes", |b| {
        b.iter(|| black_box(value.map_to_primitive(black_box(&target)).unwrap()));
    });
}

fn install_changes(name: &str, version: &str) -> ChangeSet {
    let pool: BTreeSet<Argument> = [name, version].into_iter().map(Argument::new).collect();
    let mut changes = ChangeSet::new();
    changes.insert(Change::directory_add(format!("/opt/{name}"), &pool));
    changes.insert(Change::directory_add(format!("/opt/{name}/{version}"), &pool));
    changes.insert(Change::file_add(
        format!("/opt/{name}/{version}/bin/{name}"),
        &pool,
    ));
    changes.insert(Change::env_set(format!("{name}_VERSION"), version, &pool));
    changes
}

fn bench_intersection(c: &mut Criterion) {
    let source = install_changes("tool", "1.2.3");
    let mut target = ChangeSet::new();
    for i in 0..25 {
        target.extend(install_changes(&format!("pkg{i}"), &format!("{i}.0.1")));
    }
    let options = IntersectionOptions::default();
    c.bench_function("intersect_25_installs", |b| {
        b.iter(|| black_box(change_intersection(&source, &target, &options)));
    });
}

criterion_group!(
    benches,
    bench_decompose,
    bench_alignment,
    bench_intersection
);
criterion_main!(benches);
