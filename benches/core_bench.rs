//! Benchmarks for recast core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use recast::core::enumerate::enumerate_eager;
use recast::core::parser::parse_codemod;
use recast::core::patterns::PatternResolver;
use recast::core::types::{Codemod, CodemodSource, EngineKind, FlowSettings};
use recast::fs::memory::{MemoryFs, Snapshot};
use recast::state::{hasher, snapshot};
use std::path::PathBuf;

fn codemod(include: &[&str]) -> Codemod {
    Codemod {
        name: "bench".into(),
        engine: EngineKind::SourceFile,
        transform: Some(PathBuf::from("t.sh")),
        include: include.iter().map(|s| s.to_string()).collect(),
        arguments: Default::default(),
        steps: vec![],
        source: CodemodSource::Local,
    }
}

fn tree(files: usize) -> Snapshot {
    (0..files)
        .map(|i| {
            let dir = if i % 10 == 0 { "node_modules/dep" } else { "src/mod" };
            let ext = if i % 2 == 0 { "ts" } else { "md" };
            (
                PathBuf::from(format!("/repo/{dir}{}/file_{i}.{ext}", i % 7)),
                format!("export const v{i} = {i};\n"),
            )
        })
        .collect()
}

fn bench_resolve(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".gitignore"), "dist/\n*.log\n# c\ncoverage\n").unwrap();
    let resolver = PatternResolver::default();
    let mut flow = FlowSettings::new(dir.path());
    flow.exclude = vec!["**/*.snap".into()];
    let cm = codemod(&["src/**/*.ts", "lib/", "node_modules/keep/**"]);

    c.bench_function("pattern_resolve", |b| {
        b.iter(|| black_box(resolver.resolve(black_box(&flow), black_box(&cm))));
    });
}

fn bench_enumerate_memory(c: &mut Criterion) {
    let resolver = PatternResolver::default();
    let flow = FlowSettings::new("/repo");
    let cm = codemod(&["**/*.ts"]);
    let set = resolver.resolve(&flow, &cm);

    let mut group = c.benchmark_group("enumerate_memory");
    for size in [100, 1000, 5000] {
        let view = MemoryFs::from_files(tree(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &view, |b, view| {
            b.iter(|| black_box(enumerate_eager(&set, &flow.target, view).unwrap()));
        });
    }
    group.finish();
}

fn bench_net_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("net_diff");
    for size in [100, 1000, 5000] {
        let original = tree(size);
        let mut current = original.clone();
        for (i, content) in current.values_mut().enumerate() {
            if i % 5 == 0 {
                content.push_str("// edited\n");
            }
        }
        current.insert(PathBuf::from("/repo/src/new.ts"), "new".into());
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &(original, current),
            |b, (original, current)| {
                b.iter(|| black_box(snapshot::net_diff(black_box(original), black_box(current))));
            },
        );
    }
    group.finish();
}

fn bench_snapshot_hash(c: &mut Criterion) {
    let snap = tree(1000);
    c.bench_function("snapshot_hash_1000", |b| {
        b.iter(|| black_box(hasher::hash_snapshot(black_box(&snap))));
    });
}

fn bench_descriptor_parse(c: &mut Criterion) {
    let yaml = r#"
name: upgrade
engine: recipe
steps:
  - path: steps/rename.yaml
  - name: imports
    engine: source-file
    transform: imports.sh
    include: ["src/**/*.ts", "test/**/*.ts"]
    arguments:
      from: lodash
      to: lodash-es
  - name: tidy
    engine: file-tree
    transform: tidy.sh
"#;
    c.bench_function("descriptor_parse", |b| {
        b.iter(|| black_box(parse_codemod(black_box(yaml)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_resolve,
    bench_enumerate_memory,
    bench_net_diff,
    bench_snapshot_hash,
    bench_descriptor_parse
);
criterion_main!(benches);
